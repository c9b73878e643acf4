use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Name prefix of every spool file.
pub const ARTIFACT_PREFIX: &str = "retropix-";

/// A request-owned spool file.
///
/// The file gets a random, exclusively-created name in the temp directory.
/// Call [`close`](Self::close) to remove it and observe failures; dropping
/// the artifact removes it too and logs any error.
#[derive(Debug)]
pub struct TempArtifact {
    path: Option<TempPath>,
    len: usize,
}

impl TempArtifact {
    /// Write `bytes` to a fresh file in `dir`.
    pub async fn spool(dir: &Path, bytes: Bytes) -> Result<Self, PipelineError> {
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || Self::spool_blocking(&dir, &bytes))
            .await
            .map_err(|e| PipelineError::TempArtifact {
                message: format!("spool task failed: {}", e),
            })?
    }

    fn spool_blocking(dir: &Path, bytes: &[u8]) -> Result<Self, PipelineError> {
        let mut file = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| artifact_error(dir, e))?;

        file.write_all(bytes).map_err(|e| artifact_error(file.path(), e))?;
        file.flush().map_err(|e| artifact_error(file.path(), e))?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), size = bytes.len(), "Spooled artifact");

        Ok(Self {
            path: Some(path),
            len: bytes.len(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Owned copy of the path, for handing to blocking tasks.
    pub fn path_buf(&self) -> Option<PathBuf> {
        self.path().map(Path::to_path_buf)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete the file now.
    pub fn close(mut self) -> Result<(), PipelineError> {
        match self.path.take() {
            Some(path) => {
                let shown = path.display().to_string();
                path.close().map_err(|e| PipelineError::TempArtifact {
                    message: format!("failed to remove {}: {}", shown, e),
                })?;
                debug!(path = %shown, "Removed artifact");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                warn!(path = %shown, error = %e, "Failed to remove dropped artifact");
            }
        }
    }
}

fn artifact_error(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::TempArtifact {
        message: format!("{}: {}", path.display(), err),
    }
}
