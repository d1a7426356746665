//! `JSON_PARTS` format: one JSON array per component kind.
//!
//! A network with several kinds yields several files, which the materializer
//! bundles into a zip.

use super::json::{PRETTY, write_error, write_json};
use super::{FormatParameter, FormatParameters, NetworkExporter, ParameterType};
use crate::io::DataSink;
use crate::models::Network;
use crate::Result;
use std::io::Write;

const KINDS: FormatParameter = FormatParameter {
    name: "kinds",
    kind: ParameterType::StringList,
    description: "Component kinds to export (default: all)",
    default: None,
};

/// Writes `_<kind>.json` for every component kind in the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPartsExporter;

impl NetworkExporter for JsonPartsExporter {
    fn format(&self) -> &str {
        "JSON_PARTS"
    }

    fn extension(&self) -> String {
        "json".to_string()
    }

    fn parameters(&self) -> Vec<FormatParameter> {
        vec![PRETTY, KINDS]
    }

    fn export(
        &self,
        network: &Network,
        parameters: &FormatParameters,
        sink: &mut DataSink,
    ) -> Result<()> {
        let pretty = PRETTY.flag(parameters);
        let wanted = KINDS.list(parameters);

        for (kind, components) in network.components_by_kind() {
            if let Some(wanted) = &wanted
                && !wanted.iter().any(|w| w.eq_ignore_ascii_case(kind))
            {
                continue;
            }
            let file_name = format!("_{kind}.json");
            let out = sink.create(&file_name)?;
            write_json(out, &components, pretty)?;
            out.flush().map_err(|e| write_error(&file_name, &e))?;
            tracing::debug!(kind, count = components.len(), "Wrote component part");
        }
        Ok(())
    }
}
