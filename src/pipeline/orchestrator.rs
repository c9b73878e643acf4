//! Pipeline orchestration.
//!
//! The [`Pipeline`] is the entry point for image requests. It drives one
//! request through its lifecycle:
//!
//! ```text
//! Received ──► Decoding ──► Transforming ──► Uploading ──► Verifying ──► Done
//!    │            │              │               │             │
//!    └────────────┴──────────────┴───────────────┴─────────────┴──► Failed(stage, cause)
//! ```
//!
//! - Validation (media type, size, style, key) happens before any I/O
//! - The engine runs on the blocking pool with cancellation checks between stages
//! - A transient store error on upload is retried once; nothing else is
//! - The spooled source file is removed on every exit path

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{GatewayError, PipelineError, PipelineFailure, Stage};
use crate::store::{
    file_name, validate_key, ObjectStore, ObjectStoreGateway, StorageObject, UploadResult,
};
use crate::style::{StyleProfile, StyleRegistry};
use crate::transform::{
    EncodedImage, ImageTransformer, TransformEngine, OUTPUT_CONTENT_TYPE, OUTPUT_EXTENSION,
};

use super::artifact::TempArtifact;
use super::cancel::CancelToken;
use super::media::{resolve_media, MediaType};
use super::request::{
    random_token, BatchFailure, BatchReport, ErrorResponse, ImageRequest, KeyStrategy, OwnedImage,
    ProcessedImage,
};

/// Default per-file upload limit (5MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Default number of files accepted in one batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 6;

/// Default number of retries for a transient upload failure.
pub const DEFAULT_UPLOAD_RETRIES: u32 = 1;

// =============================================================================
// Configuration
// =============================================================================

/// Limits and policies for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Largest accepted source, in bytes
    pub max_upload_bytes: usize,

    /// Largest accepted batch
    pub max_batch_size: usize,

    /// Directory for spooled sources
    pub temp_dir: PathBuf,

    /// How output keys are generated when the caller does not pick one
    pub key_strategy: KeyStrategy,

    /// Extra attempts after a transient upload failure
    pub upload_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            temp_dir: std::env::temp_dir(),
            key_strategy: KeyStrategy::default(),
            upload_retries: DEFAULT_UPLOAD_RETRIES,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".to_string());
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err("temp_dir must not be empty".to_string());
        }
        Ok(())
    }
}

/// A request that passed validation.
struct Admitted {
    profile: &'static StyleProfile,
    key: String,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Orchestrates validation, transformation and storage of image requests.
///
/// Every collaborator is injected; the pipeline holds no global state and
/// can be shared behind an `Arc` by concurrent callers. The engine defaults
/// to [`TransformEngine`]; any [`ImageTransformer`] can stand in for it.
///
/// # Example
///
/// ```ignore
/// use retropix::pipeline::{CancelToken, ImageRequest, Pipeline, PipelineConfig};
/// use retropix::style::StyleRegistry;
/// use retropix::transform::TransformEngine;
///
/// let pipeline = Pipeline::new(
///     StyleRegistry::new()?,
///     TransformEngine::new(),
///     gateway,
///     PipelineConfig::default(),
/// );
///
/// let request = ImageRequest::new(bytes, "cat.jpg", "image/jpeg", "user-1", "gameboy");
/// let processed = pipeline.process(request, &CancelToken::new()).await?;
/// println!("{}", processed.public_url);
/// ```
pub struct Pipeline<S: ObjectStore, E: ImageTransformer = TransformEngine> {
    styles: StyleRegistry,
    engine: Arc<E>,
    gateway: ObjectStoreGateway<S>,
    config: PipelineConfig,
}

impl<S: ObjectStore + 'static, E: ImageTransformer + 'static> Pipeline<S, E> {
    pub fn new(
        styles: StyleRegistry,
        engine: E,
        gateway: ObjectStoreGateway<S>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            styles,
            engine: Arc::new(engine),
            gateway,
            config,
        }
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn gateway(&self) -> &ObjectStoreGateway<S> {
        &self.gateway
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Transform one image and upload the result.
    ///
    /// # Errors
    ///
    /// Returns a `PipelineFailure` naming the stage that was active. The
    /// spooled source is removed before this returns, whatever the outcome.
    pub async fn process(
        &self,
        request: ImageRequest,
        cancel: &CancelToken,
    ) -> Result<ProcessedImage, PipelineFailure> {
        debug!(
            owner = %request.owner_id,
            file = %request.original_filename,
            style = %request.style,
            size = request.source_bytes.len(),
            stage = %Stage::Received,
            "Request received"
        );

        let admitted = self
            .admit(&request)
            .map_err(|e| self.fail(&request, Stage::Received, e))?;

        if cancel.is_cancelled() {
            return Err(self.fail(&request, Stage::Received, PipelineError::Cancelled));
        }

        let artifact = TempArtifact::spool(&self.config.temp_dir, request.source_bytes.clone())
            .await
            .map_err(|e| self.fail(&request, Stage::Received, e))?;

        let result = self.run(&request, &admitted, &artifact, cancel).await;

        // Cleanup never overrides the request's outcome
        if let Err(e) = artifact.close() {
            warn!(file = %request.original_filename, error = %e, "Artifact cleanup failed");
        }

        match result {
            Ok(processed) => {
                info!(
                    key = %processed.storage_key,
                    url = %processed.public_url,
                    style = admitted.profile.name,
                    stage = %Stage::Done,
                    "Image processed"
                );
                Ok(processed)
            }
            Err(failure) => Err(self.fail_logged(&request, failure)),
        }
    }

    /// Process several images concurrently.
    ///
    /// Failures are isolated per item; the report keeps input order.
    ///
    /// # Errors
    ///
    /// Only the batch itself can fail: when it is empty or larger than
    /// `max_batch_size`.
    pub async fn process_batch(
        self: Arc<Self>,
        requests: Vec<ImageRequest>,
        cancel: &CancelToken,
    ) -> Result<BatchReport, PipelineFailure> {
        if requests.is_empty() {
            return Err(PipelineFailure::new(
                Stage::Received,
                PipelineError::InvalidRequest {
                    reason: "no files uploaded".to_string(),
                },
            ));
        }
        if requests.len() > self.config.max_batch_size {
            return Err(PipelineFailure::new(
                Stage::Received,
                PipelineError::BatchTooLarge {
                    count: requests.len(),
                    max: self.config.max_batch_size,
                },
            ));
        }

        // Spawn every item, then join in input order
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let name = request.original_filename.clone();
            let pipeline = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push((
                name,
                tokio::spawn(async move { pipeline.process(request, &cancel).await }),
            ));
        }

        let mut report = BatchReport::default();
        for (name, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|e| {
                warn!(file = %name, error = %e, "Batch task did not complete");
                Err(PipelineFailure::new(
                    Stage::Transforming,
                    PipelineError::Internal {
                        message: "processing task aborted".to_string(),
                    },
                ))
            });
            match outcome {
                Ok(processed) => report.succeeded.push(processed),
                Err(failure) => report.failed.push(BatchFailure {
                    original_name: name,
                    error: ErrorResponse::from(&failure),
                }),
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Batch processed"
        );
        Ok(report)
    }

    /// Upload the untransformed source under `<owner>/<token>.<ext>`.
    pub async fn store_original(
        &self,
        request: ImageRequest,
    ) -> Result<ProcessedImage, PipelineFailure> {
        let media = self
            .check_source(&request)
            .map_err(|e| self.fail(&request, Stage::Received, e))?;

        let key = match &request.target_key {
            Some(key) => {
                let key = key.clone();
                self.check_owned(&request.owner_id, &key)
                    .map_err(|e| self.fail(&request, Stage::Received, e))?;
                key
            }
            None => format!(
                "{}/{}.{}",
                request.owner_id,
                random_token(),
                media.extension()
            ),
        };
        check_key(&key).map_err(|e| self.fail(&request, Stage::Received, e))?;

        let size = request.source_bytes.len() as u64;
        let object = StorageObject::new(key, media.mime(), request.source_bytes.clone());
        let uploaded = self
            .upload_verified(object)
            .await
            .map_err(|f| self.fail_logged(&request, f))?;

        info!(key = %uploaded.storage_key, owner = %request.owner_id, "Original stored");
        Ok(ProcessedImage {
            public_url: uploaded.public_url,
            storage_key: uploaded.storage_key,
            original_name: request.original_filename,
            size_bytes: size,
        })
    }

    /// Delete `key` on behalf of `owner_id`.
    ///
    /// Only keys under `"<owner_id>/"` may be deleted. A key that no longer
    /// exists is not an error.
    pub async fn delete_owned(&self, owner_id: &str, key: &str) -> Result<(), PipelineError> {
        self.check_owned(owner_id, key)?;
        check_key(key)?;

        self.gateway.delete(key).await?;
        info!(owner = owner_id, key, "Image deleted");
        Ok(())
    }

    /// List the objects stored under `"<owner_id>/"`.
    pub async fn list_owned(&self, owner_id: &str) -> Result<Vec<OwnedImage>, PipelineError> {
        check_owner(owner_id)?;

        let prefix = format!("{}/", owner_id);
        let objects = self.gateway.list(&prefix).await?;

        Ok(objects
            .into_iter()
            .map(|object| OwnedImage {
                name: file_name(&object.key).to_string(),
                public_url: self.gateway.public_url(&object.key),
                storage_key: object.key,
                size_bytes: object.size_bytes,
                last_modified: object.last_modified,
            })
            .collect())
    }

    /// Check that the storage backend answers.
    pub async fn health_check(&self) -> Result<(), PipelineError> {
        self.gateway.health_check().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Validate everything that can be checked without I/O.
    fn admit(&self, request: &ImageRequest) -> Result<Admitted, PipelineError> {
        self.check_source(request)?;
        let profile = self.styles.get(&request.style)?;

        let key = match &request.target_key {
            Some(key) => key.clone(),
            None => self.config.key_strategy.output_key(
                profile.name,
                &request.source_bytes,
                OUTPUT_EXTENSION,
            ),
        };
        check_key(&key)?;

        Ok(Admitted { profile, key })
    }

    fn check_source(&self, request: &ImageRequest) -> Result<MediaType, PipelineError> {
        check_owner(&request.owner_id)?;

        if request.source_bytes.is_empty() {
            return Err(PipelineError::InvalidRequest {
                reason: "no file uploaded".to_string(),
            });
        }

        let media = resolve_media(&request.mime_type, &request.original_filename)?;

        let size = request.source_bytes.len();
        if size > self.config.max_upload_bytes {
            return Err(PipelineError::PayloadTooLarge {
                size,
                max: self.config.max_upload_bytes,
            });
        }
        Ok(media)
    }

    fn check_owned(&self, owner_id: &str, key: &str) -> Result<(), PipelineError> {
        check_owner(owner_id)?;
        if !key.starts_with(&format!("{}/", owner_id)) {
            return Err(PipelineError::Forbidden {
                owner_id: owner_id.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Decode, transform and upload an admitted request.
    async fn run(
        &self,
        request: &ImageRequest,
        admitted: &Admitted,
        artifact: &TempArtifact,
        cancel: &CancelToken,
    ) -> Result<ProcessedImage, PipelineFailure> {
        debug!(stage = %Stage::Decoding, key = %admitted.key, "Stage transition");
        let encoded = self.transform(admitted.profile, artifact, cancel).await?;

        if cancel.is_cancelled() {
            return Err(PipelineFailure::new(Stage::Uploading, PipelineError::Cancelled));
        }

        let size = encoded.len() as u64;
        let object = StorageObject::new(admitted.key.clone(), OUTPUT_CONTENT_TYPE, encoded.bytes);
        let uploaded = self.upload_verified(object).await?;

        Ok(ProcessedImage {
            public_url: uploaded.public_url,
            storage_key: uploaded.storage_key,
            original_name: request.original_filename.clone(),
            size_bytes: size,
        })
    }

    /// Run the engine over the spooled source on the blocking pool.
    async fn transform(
        &self,
        profile: &'static StyleProfile,
        artifact: &TempArtifact,
        cancel: &CancelToken,
    ) -> Result<EncodedImage, PipelineFailure> {
        let path = artifact.path_buf().ok_or_else(|| {
            PipelineFailure::new(
                Stage::Decoding,
                PipelineError::TempArtifact {
                    message: "artifact already closed".to_string(),
                },
            )
        })?;
        let engine = Arc::clone(&self.engine);
        let cancel = cancel.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let source = std::fs::read(&path).map_err(|e| {
                PipelineFailure::new(
                    Stage::Decoding,
                    PipelineError::TempArtifact {
                        message: format!("{}: {}", path.display(), e),
                    },
                )
            })?;

            engine
                .transform_checked(&source, profile, &cancel)
                .map_err(|f| PipelineFailure::new(Stage::from(f.stage), f.error))
        })
        .await;

        let encoded = joined.map_err(|e| {
            PipelineFailure::new(
                Stage::Transforming,
                PipelineError::Internal {
                    message: format!("transform task failed: {}", e),
                },
            )
        })??;

        debug!(
            width = encoded.width,
            height = encoded.height,
            colors = encoded.palette_len,
            size = encoded.len(),
            "Transform complete"
        );
        Ok(encoded)
    }

    /// Put with one retry on a transient store error, then verify.
    async fn upload_verified(&self, object: StorageObject) -> Result<UploadResult, PipelineFailure> {
        debug!(stage = %Stage::Uploading, key = %object.key, "Stage transition");

        let mut attempt = 0;
        loop {
            match self.gateway.put(&object).await {
                Ok(()) => break,
                Err(GatewayError::Store(e))
                    if e.is_transient() && attempt < self.config.upload_retries =>
                {
                    attempt += 1;
                    warn!(key = %object.key, attempt, error = %e, "Transient upload failure, retrying");
                }
                Err(e) => return Err(PipelineFailure::new(Stage::Uploading, e)),
            }
        }

        debug!(stage = %Stage::Verifying, key = %object.key, "Stage transition");
        self.gateway
            .confirm(&object.key)
            .await
            .map_err(|e| PipelineFailure::new(Stage::Verifying, e))
    }

    fn fail(&self, request: &ImageRequest, stage: Stage, error: PipelineError) -> PipelineFailure {
        self.fail_logged(request, PipelineFailure::new(stage, error))
    }

    fn fail_logged(&self, request: &ImageRequest, failure: PipelineFailure) -> PipelineFailure {
        if failure.error.is_client_error() {
            debug!(file = %request.original_filename, kind = failure.kind(), error = %failure, "Request rejected");
        } else {
            warn!(file = %request.original_filename, kind = failure.kind(), error = %failure, "Request failed");
        }
        failure
    }
}

fn check_key(key: &str) -> Result<(), PipelineError> {
    validate_key(key).map_err(|reason| PipelineError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

fn check_owner(owner_id: &str) -> Result<(), PipelineError> {
    if owner_id.is_empty() || owner_id.contains('/') || validate_key(owner_id).is_err() {
        return Err(PipelineError::InvalidRequest {
            reason: format!("invalid owner id '{}'", owner_id),
        });
    }
    Ok(())
}
