//! `JSON` format: the whole network as one document.

use super::{FormatParameter, FormatParameters, NetworkExporter, NetworkImporter, ParameterType};
use crate::io::DataSink;
use crate::models::Network;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

const FORMAT: &str = "JSON";
const FILE_NAME: &str = "network.json";

pub(super) const PRETTY: FormatParameter = FormatParameter {
    name: "pretty",
    kind: ParameterType::Boolean,
    description: "Indent the output",
    default: Some("true"),
};

/// Writes the network as a single `network.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl NetworkExporter for JsonExporter {
    fn format(&self) -> &str {
        FORMAT
    }

    fn parameters(&self) -> Vec<FormatParameter> {
        vec![PRETTY]
    }

    fn export(
        &self,
        network: &Network,
        parameters: &FormatParameters,
        sink: &mut DataSink,
    ) -> Result<()> {
        let out = sink.create(FILE_NAME)?;
        write_json(out, network, PRETTY.flag(parameters))?;
        out.flush().map_err(|e| write_error(FILE_NAME, &e))
    }
}

/// Reads a network from a JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonImporter;

impl NetworkImporter for JsonImporter {
    fn format(&self) -> &str {
        FORMAT
    }

    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn import(&self, path: &Path, _parameters: &FormatParameters) -> Result<Network> {
        let file = File::open(path).map_err(|e| Error::OperationFailed {
            operation: "read_json".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let mut network: Network = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::InvalidInput(format!("Failed to parse JSON network: {e}")))?;
        if network.name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "JSON network has an empty name".to_string(),
            ));
        }
        network.source_format = Some(FORMAT.to_string());
        Ok(network)
    }
}

pub(super) fn write_json<W: Write, T: serde::Serialize + ?Sized>(
    out: &mut W,
    value: &T,
    pretty: bool,
) -> Result<()> {
    let written = if pretty {
        serde_json::to_writer_pretty(&mut *out, value)
    } else {
        serde_json::to_writer(&mut *out, value)
    };
    written.map_err(|e| Error::OperationFailed {
        operation: "write_json".to_string(),
        cause: e.to_string(),
    })
}

pub(super) fn write_error(file_name: &str, error: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: "write_json".to_string(),
        cause: format!("{file_name}: {error}"),
    }
}
