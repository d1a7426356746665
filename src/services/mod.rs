//! Business logic services.
//!
//! Services orchestrate the store, the format catalog and the execution pools
//! and provide the high-level import and export operations.

mod conversion;

pub use conversion::{ConversionService, ConversionServiceBuilder, ExportRequest, ImportOutcome};
