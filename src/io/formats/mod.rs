//! Format ports and the format catalog.
//!
//! Encoding and decoding of grid formats is pluggable: anything implementing
//! [`NetworkExporter`] or [`NetworkImporter`] can be registered in a
//! [`FormatCatalog`]. Two reference formats ship with the crate:
//!
//! | Format | Import | Export | Output |
//! |--------|--------|--------|--------|
//! | `JSON` | ✓ | ✓ | One `network.json` |
//! | `JSON_PARTS` | - | ✓ | One `_<kind>.json` per component kind |

mod json;
mod parts;

pub use json::{JsonExporter, JsonImporter};
pub use parts::JsonPartsExporter;

use super::DataSink;
use crate::models::Network;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Export or import parameters as received from the caller, by name.
pub type FormatParameters = BTreeMap<String, String>;

/// Writes a network into one or more files.
pub trait NetworkExporter: Send + Sync {
    /// Format tag, e.g. `JSON`.
    fn format(&self) -> &str;

    /// Extension used when the export is a single file.
    fn extension(&self) -> String {
        self.format().to_lowercase()
    }

    /// Parameters this exporter understands.
    fn parameters(&self) -> Vec<FormatParameter> {
        Vec::new()
    }

    /// Writes `network` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    fn export(
        &self,
        network: &Network,
        parameters: &FormatParameters,
        sink: &mut DataSink,
    ) -> Result<()>;
}

/// Reads a network from a case file.
pub trait NetworkImporter: Send + Sync {
    /// Format tag, e.g. `JSON`.
    fn format(&self) -> &str;

    /// Lower-case file extensions this importer accepts.
    fn extensions(&self) -> &[&str];

    /// Parameters this importer understands.
    fn parameters(&self) -> Vec<FormatParameter> {
        Vec::new()
    }

    /// Decodes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    fn import(&self, path: &Path, parameters: &FormatParameters) -> Result<Network>;
}

/// Value type of a format parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    /// `true` or `false`.
    Boolean,
    /// Signed integer.
    Integer,
    /// Any string.
    String,
    /// Comma separated strings.
    StringList,
}

impl ParameterType {
    /// Returns whether `value` is well-formed for this type.
    #[must_use]
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::Boolean => parse_bool(value).is_some(),
            Self::Integer => value.trim().parse::<i64>().is_ok(),
            Self::String | Self::StringList => true,
        }
    }
}

/// Description of one parameter a format understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatParameter {
    /// Parameter name.
    pub name: &'static str,
    /// Value type.
    #[serde(rename = "type")]
    pub kind: ParameterType,
    /// Human readable description.
    pub description: &'static str,
    /// Value used when the caller does not supply one.
    pub default: Option<&'static str>,
}

impl FormatParameter {
    /// Reads this parameter as a boolean, falling back to the default.
    #[must_use]
    pub fn flag(&self, parameters: &FormatParameters) -> bool {
        parameters
            .get(self.name)
            .map(String::as_str)
            .or(self.default)
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    /// Reads this parameter as a string list; `None` when absent.
    #[must_use]
    pub fn list(&self, parameters: &FormatParameters) -> Option<Vec<String>> {
        parameters.get(self.name).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Export format as listed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ExportFormatInfo {
    /// Format tag.
    pub format: String,
    /// Single-file extension.
    pub extension: String,
    /// Accepted parameters.
    pub parameters: Vec<FormatParameter>,
}

/// Registry of importers and exporters by format tag.
///
/// Lookups are case-insensitive.
#[derive(Clone, Default)]
pub struct FormatCatalog {
    exporters: BTreeMap<String, Arc<dyn NetworkExporter>>,
    importers: BTreeMap<String, Arc<dyn NetworkImporter>>,
}

impl fmt::Debug for FormatCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatCatalog")
            .field("exporters", &self.exporters.keys().collect::<Vec<_>>())
            .field("importers", &self.importers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FormatCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog with the built-in `JSON` and `JSON_PARTS` formats.
    #[must_use]
    pub fn with_builtin_formats() -> Self {
        Self::new()
            .with_exporter(Arc::new(JsonExporter))
            .with_exporter(Arc::new(JsonPartsExporter))
            .with_importer(Arc::new(JsonImporter))
    }

    /// Registers an exporter, replacing one with the same tag.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn NetworkExporter>) -> Self {
        self.exporters
            .insert(exporter.format().to_uppercase(), exporter);
        self
    }

    /// Registers an importer, replacing one with the same tag.
    #[must_use]
    pub fn with_importer(mut self, importer: Arc<dyn NetworkImporter>) -> Self {
        self.importers
            .insert(importer.format().to_uppercase(), importer);
        self
    }

    /// Looks up an exporter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown formats.
    pub fn exporter(&self, format: &str) -> Result<Arc<dyn NetworkExporter>> {
        self.exporters
            .get(&format.to_uppercase())
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("unknown export format: {format}")))
    }

    /// Looks up an importer by tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown formats.
    pub fn importer(&self, format: &str) -> Result<Arc<dyn NetworkImporter>> {
        self.importers
            .get(&format.to_uppercase())
            .cloned()
            .ok_or_else(|| Error::InvalidInput(format!("unknown import format: {format}")))
    }

    /// Finds the importer accepting a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no importer accepts it.
    pub fn importer_for_extension(&self, extension: &str) -> Result<Arc<dyn NetworkImporter>> {
        let extension = extension.to_lowercase();
        self.importers
            .values()
            .find(|importer| importer.extensions().contains(&extension.as_str()))
            .cloned()
            .ok_or_else(|| {
                Error::InvalidInput(format!("no importer for file extension: .{extension}"))
            })
    }

    /// Lists export formats and their parameters, sorted by tag.
    #[must_use]
    pub fn export_formats(&self) -> Vec<ExportFormatInfo> {
        self.exporters
            .iter()
            .map(|(format, exporter)| ExportFormatInfo {
                format: format.clone(),
                extension: exporter.extension(),
                parameters: exporter.parameters(),
            })
            .collect()
    }

    /// Lists import format tags, sorted.
    #[must_use]
    pub fn import_formats(&self) -> Vec<String> {
        self.importers.keys().cloned().collect()
    }
}

/// Checks caller parameters against a format's parameter catalog.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for unknown names or ill-typed values.
pub fn validate_parameters(
    format: &str,
    accepted: &[FormatParameter],
    parameters: &FormatParameters,
) -> Result<()> {
    for (name, value) in parameters {
        let Some(parameter) = accepted.iter().find(|p| p.name == name) else {
            return Err(Error::InvalidInput(format!(
                "unknown parameter '{name}' for format {format}"
            )));
        };
        if !parameter.kind.accepts(value) {
            return Err(Error::InvalidInput(format!(
                "parameter '{name}' for format {format} expects {:?}, got '{value}'",
                parameter.kind
            )));
        }
    }
    Ok(())
}
