//! Staging store for uploaded documents.
//!
//! The converter consumes filesystem paths, so every upload is copied into a uniquely named
//! temporary file before conversion. The file keeps the upload's extension because the converter
//! picks its input backend from it. [`StagedFile`] owns the file and deletes it when dropped,
//! which covers success, error returns, and panics unwinding through the handler alike.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

const STAGED_FILE_PREFIX: &str = "docling-upload-";

/// Location where uploads are staged.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    /// Stage uploads under `dir`, or the system temporary directory when `None`.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Write `bytes` to a fresh temporary file whose suffix matches `original_filename`.
    ///
    /// The returned guard is created before the bytes are written, so a failed write still removes
    /// the partially written file.
    pub async fn stage(&self, original_filename: &str, bytes: &[u8]) -> io::Result<StagedFile> {
        let suffix = staging_suffix(original_filename);
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGED_FILE_PREFIX).suffix(&suffix);
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let temp = file.into_temp_path();
        let staged = StagedFile {
            path: temp.to_path_buf(),
            temp: Some(temp),
        };
        tokio::fs::write(staged.path(), bytes).await?;
        tracing::info!(path = %staged.path().display(), bytes = bytes.len(), "Upload staged");
        Ok(staged)
    }
}

/// Suffix used for the staged copy of `filename`: its final extension including the dot, or an
/// empty string when the name has none.
pub fn staging_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// A staged upload, removed from disk when dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedFile {
    /// Path of the staged copy.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };
        let path = &self.path;
        match temp.close() {
            Ok(()) => tracing::info!(path = %path.display(), "Removed temporary file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Temporary file already gone");
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Error removing temporary file"
                );
            }
        }
    }
}
