//! # netconv
//!
//! Grid-model conversion service core.
//!
//! netconv imports grid-model case files into a network store and exports
//! stored networks back into file formats, publishing lifecycle events as it
//! goes. Format encoders and decoders are plugged in through the
//! [`io::formats`] traits; this crate owns the parts around them:
//!
//! - Two execution pools: an unbounded, context-propagating
//!   [`execution::ContextExecutor`] and a capacity-bounded
//!   [`execution::BoundedTaskRunner`] that every heavy import/export goes through
//! - Observations measuring both total latency and pure processing latency of
//!   asynchronous work ([`observability::Observer`])
//! - Export materialization into exactly one artifact, a single file or a zip
//!   bundle ([`io::ExportMaterializer`])
//! - Scratch directories and files that are removed on every exit path
//!   ([`io::scratch`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use netconv::{CaseFile, ConversionConfig, ConversionService, ExportRequest};
//!
//! let service = ConversionService::builder(&ConversionConfig::load_default()).build()?;
//! let outcome = service.import_case(CaseFile::new("grid.json", bytes), None, None).await?;
//! let artifact = service
//!     .export_network(ExportRequest::new(outcome.network_id, "JSON_PARTS", "grid"))
//!     .await?;
//! println!("{} ({} bytes)", artifact.path.display(), artifact.byte_size);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod execution;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::ConversionConfig;
pub use io::{ExportArtifact, ExportMaterializer};
pub use models::{CaseFile, ConversionEvent, Direction, Network, NetworkId};
pub use services::{ConversionService, ExportRequest, ImportOutcome};
pub use storage::{InMemoryNetworkStore, NetworkStore};

/// Error type for netconv operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Unknown format, bad export parameter, bad destination name |
/// | `NotFound` | Network id not present in the store |
/// | `OperationFailed` | I/O errors, encoder/decoder failures, recorder install failures |
/// | `ExportFailed` | Exporter produced nothing, a missing file, or zero bytes |
/// | `ResourceCleanup` | A scratch directory or file could not be removed |
/// | `Instrumentation` | An observation registry failed to record |
/// | `Suppressed` | A primary failure carrying a secondary one |
/// | `ShuttingDown` | Work submitted to a pool that is draining |
/// | `QueueSaturated` | Bounded runner queue limit or queue timeout reached |
/// | `TaskFailed` | A worker task panicked or was torn down |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Export produced no usable output.
    ///
    /// Raised when:
    /// - The exporter wrote no file at all
    /// - The exporter reported a file that is not in the scratch area
    /// - A produced file, or the committed artifact, is empty
    ///
    /// Never retried.
    #[error("export of '{destination}' failed: {reason}")]
    ExportFailed {
        /// Destination name of the export.
        destination: String,
        /// Why no artifact was committed.
        reason: String,
    },

    /// A scratch resource could not be deleted.
    #[error("failed to clean up '{}': {cause}", path.display())]
    ResourceCleanup {
        /// Location of the scratch resource.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// An observation registry failed while recording.
    ///
    /// Never returned on its own: either attached to a primary error through
    /// [`Error::Suppressed`] or logged.
    #[error("instrumentation of '{observation}' failed: {cause}")]
    Instrumentation {
        /// Observation name.
        observation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A primary error with a secondary failure that happened while handling it.
    #[error("{primary} (suppressed: {suppressed})")]
    Suppressed {
        /// The error the caller should act on.
        #[source]
        primary: Box<Error>,
        /// The secondary failure.
        suppressed: Box<Error>,
    },

    /// The pool no longer accepts work.
    #[error("{0} is shutting down")]
    ShuttingDown(String),

    /// The bounded runner refused or timed out queued work.
    #[error("task queue saturated: {0}")]
    QueueSaturated(String),

    /// A worker task did not run to completion.
    #[error("task '{task}' failed: {cause}")]
    TaskFailed {
        /// Task label.
        task: String,
        /// Panic or join failure description.
        cause: String,
    },
}

impl Error {
    /// Attaches a secondary failure to this error.
    ///
    /// The receiver stays the primary error; chained calls keep nesting so no
    /// secondary detail is lost.
    #[must_use]
    pub fn with_suppressed(self, suppressed: Self) -> Self {
        Self::Suppressed {
            primary: Box::new(self),
            suppressed: Box::new(suppressed),
        }
    }

    /// Returns the primary error, looking through any suppressed wrappers.
    #[must_use]
    pub fn primary(&self) -> &Self {
        match self {
            Self::Suppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// Returns the outermost suppressed error, if any.
    #[must_use]
    pub fn suppressed(&self) -> Option<&Self> {
        match self {
            Self::Suppressed { suppressed, .. } => Some(suppressed),
            _ => None,
        }
    }

    /// Stable code for mapping errors onto transport status.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.primary() {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::ExportFailed { .. } => "EXPORT_FAILED",
            Self::ResourceCleanup { .. } => "RESOURCE_CLEANUP_FAILED",
            Self::Instrumentation { .. } => "INSTRUMENTATION_FAILED",
            Self::ShuttingDown(_) => "SHUTTING_DOWN",
            Self::QueueSaturated(_) => "QUEUE_SATURATED",
            Self::TaskFailed { .. } => "TASK_FAILED",
            // primary() never yields a wrapper
            Self::Suppressed { .. } => "OPERATION_FAILED",
        }
    }
}

/// Result type alias for netconv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
