//! Network store port.
//!
//! The store is the authoritative home of imported networks. Services hold it
//! as `Arc<dyn NetworkStore>`; the in-memory backend serves tests and the CLI.

mod memory;

pub use memory::InMemoryNetworkStore;

use crate::Result;
use crate::models::{Network, NetworkId};
use std::sync::Arc;

/// Trait for network store backends.
pub trait NetworkStore: Send + Sync {
    /// Stores a network under a fresh id.
    fn save(&self, network: Network) -> Result<NetworkId>;

    /// Retrieves a network by id.
    fn get(&self, id: &NetworkId) -> Result<Option<Arc<Network>>>;

    /// Deletes a network by id. Returns whether it existed.
    fn delete(&self, id: &NetworkId) -> Result<bool>;

    /// Lists all network ids.
    fn list_ids(&self) -> Result<Vec<NetworkId>>;

    /// Checks if a network exists.
    fn exists(&self, id: &NetworkId) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Returns the number of stored networks.
    fn count(&self) -> Result<usize> {
        Ok(self.list_ids()?.len())
    }
}

impl std::fmt::Debug for dyn NetworkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStore")
            .field("networks", &self.count().unwrap_or_default())
            .finish()
    }
}
