use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::StoreError;

/// An object to be written under `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageObject {
    pub key: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            key: key.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One entry returned by [`ObjectStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObjectInfo {
    pub key: String,
    pub size_bytes: u64,

    /// Unix timestamp in seconds, when the backend reports one
    pub last_modified: Option<i64>,
}

/// Trait for a key-addressed object store.
///
/// This is the seam between the pipeline and a storage backend. Writes
/// overwrite by key, so uploading the same key twice is last-write-wins.
/// Implementations must be thread-safe.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `object`, replacing any existing object with the same key.
    async fn put(&self, object: &StorageObject) -> Result<(), StoreError>;

    /// Check whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove `key`.
    ///
    /// Backends that can tell the key was missing return
    /// `StoreError::NotFound`; others succeed silently.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List objects whose key starts with `prefix`, sorted by key.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, StoreError>;

    /// Read-back check run after every upload.
    ///
    /// Defaults to [`exists`](Self::exists). Stores with read-after-write
    /// consistency guarantees may override it.
    async fn verify(&self, key: &str) -> Result<bool, StoreError> {
        self.exists(key).await
    }

    /// Human-readable location of the store (for logging).
    ///
    /// For S3, this would typically be `s3://bucket`.
    fn identifier(&self) -> &str;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    async fn put(&self, object: &StorageObject) -> Result<(), StoreError> {
        (**self).put(object).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, StoreError> {
        (**self).list(prefix).await
    }

    async fn verify(&self, key: &str) -> Result<bool, StoreError> {
        (**self).verify(key).await
    }

    fn identifier(&self) -> &str {
        (**self).identifier()
    }
}
