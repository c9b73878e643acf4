//! Object store gateway.
//!
//! The gateway wraps an [`ObjectStore`] backend with the storage protocol the
//! pipeline relies on:
//!
//! 1. Keys are validated before any request is made
//! 2. `put` overwrites by key
//! 3. Every upload is read back through [`ObjectStore::verify`]
//! 4. Public URLs are derived from the key alone
//!
//! An [`UploadResult`] is only ever built after verification passes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::key::validate_key;
use super::object_store::{ObjectStore, StorageObject, StoredObjectInfo};
use super::public_url::PublicUrlBuilder;
use crate::error::{GatewayError, StoreError};

/// Key checked by [`ObjectStoreGateway::health_check`].
const HEALTH_CHECK_KEY: &str = "retropix-health-check";

/// A verified upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub storage_key: String,
    pub public_url: String,
    pub verified: bool,
}

/// Storage protocol on top of an [`ObjectStore`].
///
/// # Example
///
/// ```ignore
/// use retropix::store::{LocalDirStore, ObjectStoreGateway, PublicUrlBuilder, StorageObject};
///
/// let store = LocalDirStore::new("/var/lib/retropix").await?;
/// let urls = PublicUrlBuilder::new("https://example.com/api/images")?;
/// let gateway = ObjectStoreGateway::new(store, urls);
///
/// let result = gateway
///     .upload(StorageObject::new("gameboy_1.png", "image/png", bytes))
///     .await?;
/// println!("{}", result.public_url);
/// ```
pub struct ObjectStoreGateway<S: ObjectStore> {
    store: Arc<S>,
    urls: PublicUrlBuilder,
}

impl<S: ObjectStore> ObjectStoreGateway<S> {
    pub fn new(store: S, urls: PublicUrlBuilder) -> Self {
        Self {
            store: Arc::new(store),
            urls,
        }
    }

    /// Upload `object` and verify that it is visible.
    pub async fn upload(&self, object: StorageObject) -> Result<UploadResult, GatewayError> {
        self.put(&object).await?;
        self.confirm(&object.key).await
    }

    /// Write `object` without verifying it.
    ///
    /// Callers must follow up with [`confirm`](Self::confirm) before handing
    /// out the URL.
    pub async fn put(&self, object: &StorageObject) -> Result<(), GatewayError> {
        check_key(&object.key)?;

        debug!(
            store = self.store.identifier(),
            key = %object.key,
            size = object.len(),
            content_type = %object.content_type,
            "Putting object"
        );
        self.store.put(object).await?;
        Ok(())
    }

    /// Read back `key` and build the upload result if it is visible.
    pub async fn confirm(&self, key: &str) -> Result<UploadResult, GatewayError> {
        check_key(key)?;

        if !self.store.verify(key).await? {
            return Err(GatewayError::VerificationFailed {
                key: key.to_string(),
            });
        }

        let public_url = self.public_url(key);
        info!(store = self.store.identifier(), key, url = %public_url, "Upload verified");

        Ok(UploadResult {
            storage_key: key.to_string(),
            public_url,
            verified: true,
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool, GatewayError> {
        check_key(key)?;
        Ok(self.store.exists(key).await?)
    }

    /// Delete `key`. Deleting a key that does not exist succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        check_key(key)?;

        match self.store.delete(key).await {
            Ok(()) => {
                debug!(store = self.store.identifier(), key, "Deleted object");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                debug!(store = self.store.identifier(), key, "Delete of missing object ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List objects under `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<StoredObjectInfo>, GatewayError> {
        Ok(self.store.list(prefix).await?)
    }

    /// Public URL for `key`. Pure; performs no I/O.
    pub fn public_url(&self, key: &str) -> String {
        self.urls.url_for(key)
    }

    /// Check that the backend answers requests.
    pub async fn health_check(&self) -> Result<(), GatewayError> {
        self.store.exists(HEALTH_CHECK_KEY).await?;
        Ok(())
    }

    pub fn identifier(&self) -> &str {
        self.store.identifier()
    }
}

fn check_key(key: &str) -> Result<(), GatewayError> {
    validate_key(key).map_err(|reason| GatewayError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}
