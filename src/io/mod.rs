//! File-side I/O: format ports, export materialization and scratch storage.
//!
//! # Architecture
//!
//! - **Format adapters** implement [`NetworkExporter`] / [`NetworkImporter`]
//!   and are looked up in a [`FormatCatalog`]
//! - **Exporters** write into a [`DataSink`] rooted in a scratch directory
//! - **[`ExportMaterializer`]** turns that output into one committed
//!   [`ExportArtifact`]
//! - **[`scratch`]** owns the lifetime of every temporary directory and file
//!
//! # Example
//!
//! ```rust,ignore
//! use netconv::io::{ExportMaterializer, ScratchSpace, formats::FormatCatalog};
//!
//! let catalog = FormatCatalog::with_builtin_formats();
//! let materializer = ExportMaterializer::new("/var/lib/netconv", ScratchSpace::system());
//! let artifact = materializer.materialize(
//!     &network,
//!     catalog.exporter("JSON_PARTS")?.as_ref(),
//!     "grid",
//!     &Default::default(),
//! )?;
//! ```

pub mod formats;
mod materializer;
pub mod scratch;
mod sink;

pub use formats::{
    ExportFormatInfo, FormatCatalog, FormatParameter, FormatParameters, NetworkExporter,
    NetworkImporter, ParameterType,
};
pub use materializer::{ExportArtifact, ExportMaterializer};
pub use scratch::{ScratchSpace, with_temp_directory, with_temp_file};
pub use sink::DataSink;
