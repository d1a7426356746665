//! Binary entry point for netconv.
//!
//! This binary provides a CLI over the conversion service: list the export
//! formats, or convert a case file into one of them.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use netconv::config::ConversionConfig;
use netconv::io::FormatParameters;
use netconv::observability::{self, InitOptions, RequestContext, scope_request_context};
use netconv::{CaseFile, ConversionService, ExportArtifact, ExportRequest};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// netconv - grid-model case file conversion.
#[derive(Parser)]
#[command(name = "netconv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "NETCONV_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List export formats and their parameters as JSON.
    Formats,

    /// Import a case file and export it into another format.
    Convert {
        /// Case file to import.
        case: PathBuf,

        /// Target export format, e.g. `JSON_PARTS`.
        #[arg(short, long)]
        to: String,

        /// Source format (default: detected from the file extension).
        #[arg(long)]
        from: Option<String>,

        /// Artifact base name (default: the case file stem).
        #[arg(short, long)]
        name: Option<String>,

        /// Export parameter as NAME=VALUE (repeatable).
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Directory to move the artifact into (default: the artifact directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = scope_request_context(RequestContext::new(), run_command(cli, config)).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(cli: Cli, config: ConversionConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Formats => {
            let service = ConversionService::builder(&config).build()?;
            println!("{}", serde_json::to_string_pretty(&service.export_formats())?);
            Ok(())
        },
        Commands::Convert {
            case,
            to,
            from,
            name,
            params,
            output,
        } => {
            let service = ConversionService::builder(&config).build()?;
            let result = convert(&service, &case, to, from, name, params, output.as_deref()).await;
            service.shutdown().await;
            let artifact = result?;
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            Ok(())
        },
    }
}

/// Imports `case` and exports it as `to`.
async fn convert(
    service: &ConversionService,
    case: &Path,
    to: String,
    from: Option<String>,
    name: Option<String>,
    params: Vec<(String, String)>,
    output: Option<&Path>,
) -> Result<ExportArtifact, Box<dyn std::error::Error>> {
    let case_file = CaseFile::read(case)?;
    let destination = name.unwrap_or_else(|| {
        case.file_stem()
            .map_or_else(|| "network".to_string(), |s| s.to_string_lossy().into_owned())
    });

    let imported = service.import_case(case_file, from, None).await?;
    let mut request = ExportRequest::new(imported.network_id, to, destination);
    request.parameters = params.into_iter().collect::<FormatParameters>();
    let artifact = service.export_network(request).await?;

    match output {
        Some(dir) => Ok(artifact.relocate(dir)?),
        None => Ok(artifact),
    }
}

/// Loads configuration from an explicit path or the default location.
fn load_config(path: Option<&str>) -> Result<ConversionConfig, Box<dyn std::error::Error>> {
    if let Some(config_path) = path.filter(|p| !p.trim().is_empty()) {
        return ConversionConfig::load_from_file(Path::new(config_path))
            .map_err(std::convert::Into::into);
    }
    Ok(ConversionConfig::load_default())
}

/// Parses a `NAME=VALUE` export parameter.
fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
