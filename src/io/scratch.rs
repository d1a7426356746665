//! Scoped scratch directories and files.
//!
//! A scratch resource lives exactly as long as the closure it is handed to.
//! It is removed when the closure returns, whether it succeeded or failed, and
//! on unwind. Failing to remove it is reported, but never in place of a
//! failure from the closure itself:
//!
//! | Body | Cleanup | Caller sees |
//! |------|---------|-------------|
//! | `Ok(v)` | ok | `Ok(v)` |
//! | `Ok(_)` | fails (B) | `Err(ResourceCleanup)` |
//! | `Err(A)` | ok | `Err(A)` |
//! | `Err(A)` | fails (B) | `Err(A)` with B suppressed |

use crate::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};

/// Root under which scratch resources are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl Default for ScratchSpace {
    fn default() -> Self {
        Self::system()
    }
}

impl ScratchSpace {
    /// Scratch space rooted at `root`, created on first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch space in the system temp directory.
    #[must_use]
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs `body` with a fresh, uniquely named directory.
    ///
    /// The directory and everything in it is removed afterwards.
    ///
    /// # Errors
    ///
    /// Returns the body's error, [`Error::ResourceCleanup`] when only the
    /// removal failed, or the body's error with the removal failure
    /// suppressed when both failed.
    pub fn with_temp_directory<T, F>(&self, prefix: &str, body: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        self.ensure_root()?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.root)
            .map_err(|e| create_error("create_temp_directory", &self.root, &e))?;
        let path = dir.path().to_path_buf();
        tracing::info!(path = %path.display(), "Created temp directory");

        let outcome = body(&path);
        settle(&path, outcome, dir.close())
    }

    /// Runs `body` with the path of a fresh, uniquely named empty file.
    ///
    /// No handle is held open while `body` runs. The file is removed
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Same rules as [`Self::with_temp_directory`].
    pub fn with_temp_file<T, F>(&self, prefix: &str, suffix: &str, body: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        self.ensure_root()?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.root)
            .map_err(|e| create_error("create_temp_file", &self.root, &e))?
            .into_temp_path();
        let path = file.to_path_buf();
        tracing::info!(path = %path.display(), "Created temp file");

        let outcome = body(&path);
        settle(&path, outcome, file.close())
    }

    fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| create_error("create_scratch_root", &self.root, &e))
    }
}

/// Runs `body` with a fresh directory under the system temp directory.
///
/// # Errors
///
/// See [`ScratchSpace::with_temp_directory`].
pub fn with_temp_directory<T, F>(prefix: &str, body: F) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    ScratchSpace::system().with_temp_directory(prefix, body)
}

/// Runs `body` with a fresh file under the system temp directory.
///
/// # Errors
///
/// See [`ScratchSpace::with_temp_file`].
pub fn with_temp_file<T, F>(prefix: &str, suffix: &str, body: F) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    ScratchSpace::system().with_temp_file(prefix, suffix, body)
}

fn create_error(operation: &str, root: &Path, error: &io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {error}", root.display()),
    }
}

/// Combines the body outcome with the cleanup outcome.
fn settle<T>(path: &Path, outcome: Result<T>, cleanup: io::Result<()>) -> Result<T> {
    let cleanup = cleanup.map_err(|e| Error::ResourceCleanup {
        path: path.to_path_buf(),
        cause: e.to_string(),
    });

    match (outcome, cleanup) {
        (Ok(value), Ok(())) => {
            tracing::debug!(path = %path.display(), "Deleted temp resource");
            Ok(value)
        },
        (Ok(_), Err(cleanup_err)) => {
            tracing::error!(path = %path.display(), error = %cleanup_err, "Failed to delete temp resource");
            Err(cleanup_err)
        },
        (Err(err), Ok(())) => {
            tracing::debug!(path = %path.display(), "Deleted temp resource after failure");
            Err(err)
        },
        (Err(err), Err(cleanup_err)) => {
            tracing::error!(
                path = %path.display(),
                error = %cleanup_err,
                primary = %err,
                "Failed to delete temp resource after failure"
            );
            Err(err.with_suppressed(cleanup_err))
        },
    }
}
