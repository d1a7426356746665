//! Output sink handed to exporters.

use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Directory-backed sink an exporter writes its files into.
///
/// Every file created through the sink is remembered so the materializer can
/// tell a file the exporter claimed to write from one it actually wrote.
/// The sink keeps the writers it hands out; [`Self::finish`] flushes them so
/// a failed write surfaces instead of being lost on drop.
#[derive(Debug)]
pub struct DataSink {
    dir: PathBuf,
    reported: BTreeSet<String>,
    open: BTreeMap<String, BufWriter<File>>,
}

impl DataSink {
    /// Creates a sink over an existing directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reported: BTreeSet::new(),
            open: BTreeMap::new(),
        }
    }

    /// Directory the sink writes into.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Creates (or truncates) a file in the sink.
    ///
    /// The writer stays owned by the sink. Creating a name again first
    /// flushes the previous writer for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for names that are empty or contain a
    /// path separator, or an I/O failure.
    pub fn create(&mut self, file_name: &str) -> Result<&mut BufWriter<File>> {
        validate_file_name(file_name)?;
        if let Some(previous) = self.open.remove(file_name) {
            close_writer(file_name, previous)?;
        }
        let file = File::create(self.dir.join(file_name)).map_err(|e| Error::OperationFailed {
            operation: "create_export_file".to_string(),
            cause: format!("{file_name}: {e}"),
        })?;
        self.reported.insert(file_name.to_string());
        tracing::trace!(file = file_name, "Export file opened");
        Ok(self
            .open
            .entry(file_name.to_string())
            .or_insert_with(|| BufWriter::new(file)))
    }

    /// Flushes and syncs every file opened through [`Self::create`].
    ///
    /// # Errors
    ///
    /// Returns the first flush or sync failure.
    pub fn finish(&mut self) -> Result<()> {
        for (name, writer) in std::mem::take(&mut self.open) {
            close_writer(&name, writer)?;
        }
        Ok(())
    }

    /// Records a file the exporter wrote without going through [`Self::create`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for invalid names.
    pub fn report(&mut self, file_name: &str) -> Result<()> {
        validate_file_name(file_name)?;
        self.reported.insert(file_name.to_string());
        Ok(())
    }

    /// Names the exporter reported, in sorted order.
    pub fn reported(&self) -> impl Iterator<Item = &str> {
        self.reported.iter().map(String::as_str)
    }

    /// Regular files actually present in the sink directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn produced(&self) -> Result<Vec<String>> {
        let list_error = |e: std::io::Error| Error::OperationFailed {
            operation: "list_export_files".to_string(),
            cause: format!("{}: {e}", self.dir.display()),
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(list_error)? {
            let entry = entry.map_err(list_error)?;
            if entry.file_type().map_err(list_error)?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn close_writer(file_name: &str, mut writer: BufWriter<File>) -> Result<()> {
    let flush_error = |e: std::io::Error| Error::OperationFailed {
        operation: "flush_export_file".to_string(),
        cause: format!("{file_name}: {e}"),
    };
    writer.flush().map_err(flush_error)?;
    writer.get_ref().sync_all().map_err(flush_error)
}

fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\'])
    {
        return Err(Error::InvalidInput(format!(
            "invalid export file name: '{file_name}'"
        )));
    }
    Ok(())
}
