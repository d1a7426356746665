//! Conversion lifecycle events.

use super::{Direction, NetworkId};
use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata required for observability.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Optional correlation identifier for request/trace linking.
    pub correlation_id: Option<String>,
    /// Event source component.
    pub source: &'static str,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(source: &'static str, correlation_id: Option<String>) -> Self {
        Self::with_timestamp(source, correlation_id, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(
        source: &'static str,
        correlation_id: Option<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id,
            source,
            timestamp,
        }
    }
}

/// Events emitted during conversions.
#[derive(Debug, Clone)]
pub enum ConversionEvent {
    /// A case file was imported and stored.
    Imported {
        /// Event metadata.
        meta: EventMeta,
        /// Id assigned by the store.
        network_id: NetworkId,
        /// Case format.
        format: String,
        /// Number of imported elements.
        entity_count: usize,
    },
    /// A network was exported into an artifact.
    Exported {
        /// Event metadata.
        meta: EventMeta,
        /// Exported network.
        network_id: NetworkId,
        /// Target format.
        format: String,
        /// Artifact display name.
        artifact_name: String,
        /// Artifact size in bytes.
        byte_size: u64,
    },
    /// A conversion failed.
    Failed {
        /// Event metadata.
        meta: EventMeta,
        /// Import or export.
        direction: Direction,
        /// Format involved.
        format: String,
        /// Stable error code.
        code: &'static str,
        /// Error message.
        reason: String,
    },
}

impl ConversionEvent {
    /// Returns the event type as a string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Imported { .. } => "imported",
            Self::Exported { .. } => "exported",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::Imported { meta, .. } | Self::Exported { meta, .. } | Self::Failed { meta, .. } => {
                meta
            },
        }
    }
}
