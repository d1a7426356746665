//! Network and case file types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Identifier of a network in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    /// Creates an id from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One identifiable network element (bus, line, generator...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Element identifier, unique within the network.
    pub id: String,
    /// Element kind, e.g. `line` or `generator`.
    pub kind: String,
    /// Free-form attributes carried through conversions untouched.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// In-memory network model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network name as found in the case file.
    pub name: String,
    /// Format the network was imported from.
    #[serde(default)]
    pub source_format: Option<String>,
    /// Network elements.
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_format: None,
            components: Vec::new(),
        }
    }

    /// Adds a component.
    #[must_use]
    pub fn with_component(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.components.push(Component {
            id: id.into(),
            kind: kind.into(),
            properties: BTreeMap::new(),
        });
        self
    }

    /// Number of identifiable elements, the model size used in metrics.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.components.len()
    }

    /// Groups components by kind, in kind order.
    #[must_use]
    pub fn components_by_kind(&self) -> BTreeMap<&str, Vec<&Component>> {
        let mut groups: BTreeMap<&str, Vec<&Component>> = BTreeMap::new();
        for component in &self.components {
            groups.entry(component.kind.as_str()).or_default().push(component);
        }
        groups
    }
}

/// A case file as received from the case server.
#[derive(Debug, Clone)]
pub struct CaseFile {
    /// Original file name, used for format detection.
    pub name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl CaseFile {
    /// Creates a case file.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads a case file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(path: &Path) -> crate::Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| crate::Error::OperationFailed {
            operation: "read_case_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let name = path
            .file_name()
            .map_or_else(|| "case".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, bytes })
    }

    /// Lower-cased file extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_by_kind_groups_and_orders() {
        let network = Network::new("grid")
            .with_component("L1", "line")
            .with_component("G1", "generator")
            .with_component("L2", "line");

        let groups = network.components_by_kind();
        let kinds: Vec<_> = groups.keys().copied().collect();
        assert_eq!(kinds, vec!["generator", "line"]);
        assert_eq!(groups["line"].len(), 2);
        assert_eq!(network.entity_count(), 3);
    }

    #[test]
    fn test_case_file_extension() {
        assert_eq!(
            CaseFile::new("Grid.JSON", Vec::new()).extension().as_deref(),
            Some("json")
        );
        assert_eq!(CaseFile::new("grid", Vec::new()).extension(), None);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(NetworkId::generate(), NetworkId::generate());
    }
}
