//! Data models.
//!
//! The network model here is deliberately minimal: format codecs own the real
//! grid semantics, this crate only moves networks between the store, the
//! worker pools and the export pipeline.

mod events;
mod network;

pub use events::{ConversionEvent, EventMeta};
pub use network::{CaseFile, Component, Network, NetworkId};

use std::fmt;

/// Direction of a conversion, used to tag metrics and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Case file into the network store.
    Import,
    /// Stored network into a file artifact.
    Export,
}

impl Direction {
    /// Returns the lowercase tag value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
        }
    }

    /// Request counter name (`conversion.import`, `conversion.export`).
    #[must_use]
    pub const fn request_metric(self) -> &'static str {
        match self {
            Self::Import => "conversion.import",
            Self::Export => "conversion.export",
        }
    }

    /// Observation name of the total window, queueing included.
    #[must_use]
    pub const fn total_metric(self) -> &'static str {
        match self {
            Self::Import => "conversion.import.total",
            Self::Export => "conversion.export.total",
        }
    }

    /// Observation name of the processing-only window.
    #[must_use]
    pub const fn processing_metric(self) -> &'static str {
        match self {
            Self::Import => "conversion.import.processing",
            Self::Export => "conversion.export.processing",
        }
    }

    /// Histogram name for processed entity counts.
    #[must_use]
    pub const fn entity_count_metric(self) -> &'static str {
        match self {
            Self::Import => "conversion.import.entity.count",
            Self::Export => "conversion.export.entity.count",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_metric_names() {
        assert_eq!(Direction::Import.request_metric(), "conversion.import");
        assert_eq!(Direction::Export.total_metric(), "conversion.export.total");
        assert_eq!(
            Direction::Import.processing_metric(),
            "conversion.import.processing"
        );
        assert_eq!(Direction::Export.to_string(), "export");
    }
}
