//! In-memory network store.

use super::NetworkStore;
use crate::models::{Network, NetworkId};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory network store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
#[derive(Debug, Default)]
pub struct InMemoryNetworkStore {
    networks: RwLock<HashMap<NetworkId, Arc<Network>>>,
}

impl InMemoryNetworkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "network store lock poisoned".to_string(),
    }
}

impl NetworkStore for InMemoryNetworkStore {
    fn save(&self, network: Network) -> Result<NetworkId> {
        let id = NetworkId::generate();
        let mut networks = self.networks.write().map_err(|_| poisoned("save_network"))?;
        networks.insert(id.clone(), Arc::new(network));
        tracing::debug!(network_id = %id, "Network stored");
        Ok(id)
    }

    fn get(&self, id: &NetworkId) -> Result<Option<Arc<Network>>> {
        let networks = self.networks.read().map_err(|_| poisoned("get_network"))?;
        Ok(networks.get(id).cloned())
    }

    fn delete(&self, id: &NetworkId) -> Result<bool> {
        let mut networks = self
            .networks
            .write()
            .map_err(|_| poisoned("delete_network"))?;
        Ok(networks.remove(id).is_some())
    }

    fn list_ids(&self) -> Result<Vec<NetworkId>> {
        let networks = self.networks.read().map_err(|_| poisoned("list_networks"))?;
        let mut ids: Vec<_> = networks.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
