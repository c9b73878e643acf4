use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use super::key::validate_key;
use super::object_store::{ObjectStore, StorageObject, StoredObjectInfo};
use crate::error::StoreError;

/// Prefix of in-flight write files, hidden from listings.
const PARTIAL_PREFIX: &str = ".partial-";

/// Directory-backed implementation of ObjectStore.
///
/// Keys map to relative paths under `root`; `/` in a key creates
/// subdirectories. Writes go to a hidden temp file in the target directory
/// and are renamed into place, so readers never observe a partial object.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
    identifier: String,
}

impl LocalDirStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| fs_error(&root, e))?;

        let identifier = format!("file://{}", root.display());
        Ok(Self { root, identifier })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` to a path under the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key).map_err(|reason| StoreError::Filesystem {
            path: key.to_string(),
            message: reason.to_string(),
        })?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalDirStore {
    async fn put(&self, object: &StorageObject) -> Result<(), StoreError> {
        let path = self.path_for(&object.key)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| fs_error(&parent, e))?;

        let bytes = object.bytes.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut partial = tempfile::Builder::new()
                .prefix(PARTIAL_PREFIX)
                .tempfile_in(&parent)
                .map_err(|e| fs_error(&parent, e))?;
            write_all(&mut partial, &bytes, &path)?;
            partial
                .persist(&path)
                .map_err(|e| fs_error(&path, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Filesystem {
            path: object.key.clone(),
            message: format!("write task failed: {}", e),
        })?
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(fs_error(&path, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(fs_error(&path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(fs_error(&dir, e)),
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| fs_error(&dir, e))? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(|e| fs_error(&path, e))?;

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX) {
                    continue;
                }
                let Some(key) = key_for(&self.root, &path) else {
                    debug!(path = %path.display(), "Skipping non UTF-8 path");
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }

                let last_modified = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64);

                objects.push(StoredObjectInfo {
                    key,
                    size_bytes: meta.len(),
                    last_modified,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Key of `path` relative to `root`, with `/` separators.
fn key_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
    Some(segments?.join("/"))
}

fn write_all(file: &mut NamedTempFile, bytes: &[u8], target: &Path) -> Result<(), StoreError> {
    file.write_all(bytes).map_err(|e| fs_error(target, e))?;
    file.as_file().sync_all().map_err(|e| fs_error(target, e))
}

fn fs_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Filesystem {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
