//! Delivery of exported files.
//!
//! The recorder hands a file name, a UTF-8 payload and its MIME type to a
//! [`FileExporter`]; where the bytes end up is the exporter's business.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};

/// Destination for exported documents.
pub trait FileExporter: Send {
    /// Deliver `payload` under `filename`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be delivered.
    fn export(&mut self, filename: &str, payload: &str, mime_type: &str) -> Result<()>;
}

/// Writes exported files into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    dir: PathBuf,
}

impl DirectoryExporter {
    /// Export into `dir`, creating it on first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a file with this name lands.
    #[must_use]
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

impl FileExporter for DirectoryExporter {
    fn export(&mut self, filename: &str, payload: &str, mime_type: &str) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
        }

        let path = self.path_for(filename);
        std::fs::write(&path, payload)?;
        info!(mime_type, bytes = payload.len(), "Exported {}", path.display());
        Ok(())
    }
}
