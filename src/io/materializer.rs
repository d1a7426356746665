//! Export materialization.
//!
//! Turns an in-memory network into exactly one committed file:
//!
//! | Files produced | Artifact |
//! |----------------|----------|
//! | 0 | none, [`Error::ExportFailed`] |
//! | 1 | `<destination>.<extension>`, byte-identical copy |
//! | n > 1 | `<destination>.zip`, entries `<destination><file name>` |
//!
//! The exporter writes into a scratch directory that is gone by the time
//! `materialize` returns. The artifact is staged beside its final location
//! and renamed into place, so a failed export never leaves a partial file.
//! Every export commits into its own directory under the artifact directory,
//! so concurrent exports with the same destination name never collide.

use super::formats::{FormatParameters, NetworkExporter};
use super::{DataSink, ScratchSpace};
use crate::config::ConversionConfig;
use crate::models::Network;
use crate::observability::EntityCount;
use crate::{Error, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter};

/// A committed export file, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    /// File name of the artifact, e.g. `grid.zip`.
    pub display_name: String,
    /// Location of the artifact.
    pub path: PathBuf,
    /// Entity count of the exported network.
    pub entity_count: usize,
    /// Artifact size in bytes, always positive.
    pub byte_size: u64,
    /// Per-export directory holding the artifact, while it is still there.
    #[serde(skip)]
    commit_dir: Option<PathBuf>,
}

impl ExportArtifact {
    /// Deletes the artifact once the caller is done with it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceCleanup`] if the file or its commit directory
    /// cannot be removed.
    pub fn discard(self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|e| cleanup_error(&self.path, &e))?;
        self.release_commit_dir()
    }

    /// Moves the artifact into `dir`, keeping its display name.
    ///
    /// Falls back to copy and delete when a rename is not possible.
    ///
    /// # Errors
    ///
    /// Returns an I/O failure; the artifact stays where it was unless the
    /// copy completed.
    pub fn relocate(self, dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| io_error("create_output_dir", dir, &e))?;
        let target = dir.join(&self.display_name);
        if std::fs::rename(&self.path, &target).is_err() {
            std::fs::copy(&self.path, &target)
                .map_err(|e| io_error("copy_artifact", &target, &e))?;
            std::fs::remove_file(&self.path).map_err(|e| cleanup_error(&self.path, &e))?;
        }
        self.release_commit_dir()?;
        Ok(Self {
            path: target,
            commit_dir: None,
            ..self
        })
    }

    fn release_commit_dir(&self) -> Result<()> {
        match &self.commit_dir {
            Some(dir) => std::fs::remove_dir(dir).map_err(|e| cleanup_error(dir, &e)),
            None => Ok(()),
        }
    }
}

impl EntityCount for ExportArtifact {
    fn entity_count(&self) -> Option<usize> {
        Some(self.entity_count)
    }
}

/// Runs exporters and commits their output as a single artifact.
#[derive(Debug, Clone)]
pub struct ExportMaterializer {
    artifact_dir: PathBuf,
    scratch: ScratchSpace,
}

impl ExportMaterializer {
    /// Creates a materializer committing into `artifact_dir`.
    #[must_use]
    pub fn new(artifact_dir: impl Into<PathBuf>, scratch: ScratchSpace) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            scratch,
        }
    }

    /// Creates a materializer from configuration.
    #[must_use]
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(
            config.artifact_dir.clone(),
            ScratchSpace::new(config.scratch_root()),
        )
    }

    /// Directory artifacts are committed to.
    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Exports `network` and commits the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad destination name,
    /// [`Error::ExportFailed`] when the exporter produced nothing usable, or
    /// any exporter or I/O failure. Scratch cleanup failures are attached to
    /// those as suppressed detail.
    pub fn materialize(
        &self,
        network: &Network,
        exporter: &dyn NetworkExporter,
        destination_name: &str,
        parameters: &FormatParameters,
    ) -> Result<ExportArtifact> {
        validate_destination(destination_name)?;
        std::fs::create_dir_all(&self.artifact_dir)
            .map_err(|e| io_error("create_artifact_dir", &self.artifact_dir, &e))?;

        self.scratch
            .with_temp_directory("netconv-export-", |scratch_dir| {
                let mut sink = DataSink::new(scratch_dir);
                exporter.export(network, parameters, &mut sink)?;
                sink.finish()?;

                let produced = checked_output(&sink, destination_name)?;
                let (display_name, staged) = match produced.as_slice() {
                    [single] => {
                        let name = format!("{destination_name}.{}", exporter.extension());
                        (name, self.stage_copy(&scratch_dir.join(single))?)
                    },
                    files => {
                        let name = format!("{destination_name}.zip");
                        (name, self.stage_zip(scratch_dir, files, destination_name)?)
                    },
                };

                let byte_size = staged
                    .as_file()
                    .metadata()
                    .map_err(|e| io_error("stat_artifact", staged.path(), &e))?
                    .len();
                if byte_size == 0 {
                    return Err(export_failed(destination_name, "artifact is empty"));
                }

                let (commit_dir, path) = self.commit(staged, &display_name)?;

                tracing::info!(
                    artifact = %path.display(),
                    files = produced.len(),
                    byte_size,
                    format = exporter.format(),
                    "Export artifact committed"
                );
                Ok(ExportArtifact {
                    display_name,
                    path,
                    entity_count: network.entity_count(),
                    byte_size,
                    commit_dir: Some(commit_dir),
                })
            })
    }

    /// Moves a staged artifact into a fresh directory of its own.
    fn commit(&self, staged: NamedTempFile, display_name: &str) -> Result<(PathBuf, PathBuf)> {
        let dir = self.artifact_dir.join(Uuid::now_v7().to_string());
        std::fs::create_dir(&dir).map_err(|e| io_error("create_commit_dir", &dir, &e))?;
        let path = dir.join(display_name);

        if let Err(e) = staged.persist(&path) {
            let error = io_error("commit_artifact", &path, &e.error);
            return Err(match std::fs::remove_dir(&dir) {
                Ok(()) => error,
                Err(cleanup) => error.with_suppressed(cleanup_error(&dir, &cleanup)),
            });
        }
        Ok((dir, path))
    }

    fn staging_file(&self) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.artifact_dir)
            .map_err(|e| io_error("stage_artifact", &self.artifact_dir, &e))
    }

    fn stage_copy(&self, source: &Path) -> Result<NamedTempFile> {
        let mut staged = self.staging_file()?;
        let mut input = File::open(source).map_err(|e| io_error("open_export_file", source, &e))?;
        std::io::copy(&mut input, staged.as_file_mut())
            .map_err(|e| io_error("copy_export_file", source, &e))?;
        Ok(staged)
    }

    fn stage_zip(
        &self,
        scratch_dir: &Path,
        files: &[String],
        destination_name: &str,
    ) -> Result<NamedTempFile> {
        let mut staged = self.staging_file()?;
        write_zip(staged.as_file_mut(), scratch_dir, files, destination_name)?;
        Ok(staged)
    }
}

/// Lists produced files and rejects missing or empty ones.
fn checked_output(sink: &DataSink, destination_name: &str) -> Result<Vec<String>> {
    let produced = sink.produced()?;

    if let Some(missing) = sink
        .reported()
        .find(|name| !produced.iter().any(|p| p == name))
    {
        return Err(export_failed(
            destination_name,
            &format!("reported file '{missing}' was not written"),
        ));
    }
    if produced.is_empty() {
        return Err(export_failed(destination_name, "exporter produced no file"));
    }

    for name in &produced {
        let path = sink.directory().join(name);
        let len = std::fs::metadata(&path)
            .map_err(|e| io_error("stat_export_file", &path, &e))?
            .len();
        if len == 0 {
            return Err(export_failed(
                destination_name,
                &format!("produced file '{name}' is empty"),
            ));
        }
    }

    tracing::debug!(files = ?produced, "Exporter output listed");
    Ok(produced)
}

fn write_zip<W: Write + Seek>(
    out: W,
    scratch_dir: &Path,
    files: &[String],
    destination_name: &str,
) -> Result<()> {
    let zip_error = |e: zip::result::ZipError| Error::OperationFailed {
        operation: "write_zip".to_string(),
        cause: e.to_string(),
    };

    let mut zip = ZipWriter::new(out);
    for name in files {
        let path = scratch_dir.join(name);
        let mut input = File::open(&path).map_err(|e| io_error("open_export_file", &path, &e))?;
        let size = input
            .metadata()
            .map_err(|e| io_error("stat_export_file", &path, &e))?
            .len();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));

        zip.start_file(format!("{destination_name}{name}"), options)
            .map_err(zip_error)?;
        std::io::copy(&mut input, &mut zip).map_err(|e| io_error("write_zip", &path, &e))?;
    }
    zip.finish().map_err(zip_error)?;
    Ok(())
}

fn validate_destination(destination_name: &str) -> Result<()> {
    if destination_name.trim().is_empty()
        || destination_name == "."
        || destination_name == ".."
        || destination_name.contains(['/', '\\'])
    {
        return Err(Error::InvalidInput(format!(
            "invalid destination name: '{destination_name}'"
        )));
    }
    Ok(())
}

fn export_failed(destination_name: &str, reason: &str) -> Error {
    Error::ExportFailed {
        destination: destination_name.to_string(),
        reason: reason.to_string(),
    }
}

fn cleanup_error(path: &Path, error: &std::io::Error) -> Error {
    Error::ResourceCleanup {
        path: path.to_path_buf(),
        cause: error.to_string(),
    }
}

fn io_error(operation: &str, path: &Path, error: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {error}", path.display()),
    }
}
