use std::fmt;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Transformation Errors
// =============================================================================

/// A stage inside the transformation engine.
///
/// Stages always run in declaration order; each consumes the previous stage's
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStage {
    Decode,
    FitCanvas,
    AdjustColor,
    Pixelate,
    Quantize,
    Encode,
}

impl EngineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStage::Decode => "decode",
            EngineStage::FitCanvas => "fit_canvas",
            EngineStage::AdjustColor => "adjust_color",
            EngineStage::Pixelate => "pixelate",
            EngineStage::Quantize => "quantize",
            EngineStage::Encode => "encode",
        }
    }
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the transformation engine and its stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Source bytes are malformed or in a format the codec stack cannot read
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Raster buffer does not match its declared geometry
    #[error("Invalid raster: {reason}")]
    InvalidRaster { reason: String },

    /// Quantizer was handed a malformed buffer (indicates an engine bug)
    #[error("Quantization failed: {reason}")]
    Quantization { reason: String },

    /// Final encoding failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Style parameters cannot drive the engine
    #[error("Invalid style profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// Cancellation was observed before `stage` started
    #[error("Transformation cancelled before {stage}")]
    Cancelled { stage: EngineStage },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors from an object store backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network, dispatch or timeout failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store answered with a throttling or server-side status
    #[error("Store unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Credentials were rejected for the operation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Local filesystem failure in a directory-backed store
    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: String, message: String },
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::Unavailable { .. }
        )
    }
}

/// Errors reported by the object store gateway.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store accepted the bytes but the read-back check did not see them
    #[error("Upload of '{key}' was accepted but is not visible in the store")]
    VerificationFailed { key: String },

    /// Key is not usable as an object key
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}

// =============================================================================
// Style Errors
// =============================================================================

/// Errors from the style registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StyleError {
    #[error("Unknown style '{name}' (available: {available})")]
    UnknownStyle { name: String, available: String },
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// Top-level error taxonomy returned to callers of the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Unsupported media type '{mime_type}' for file extension '{extension}'")]
    UnsupportedMediaType { mime_type: String, extension: String },

    #[error("Payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Batch of {count} images exceeds the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    UnknownStyle(#[from] StyleError),

    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    #[error("Quantization failed: {reason}")]
    Quantization { reason: String },

    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    #[error("Upload failed: {0}")]
    Upload(StoreError),

    #[error("Upload of '{key}' could not be verified")]
    VerificationFailed { key: String },

    #[error("Owner '{owner_id}' may not modify '{key}'")]
    Forbidden { owner_id: String, key: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Temporary artifact error: {message}")]
    TempArtifact { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Stable machine-readable identifier used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedMediaType { .. } => "unsupported_media_type",
            PipelineError::PayloadTooLarge { .. } | PipelineError::BatchTooLarge { .. } => {
                "payload_too_large"
            }
            PipelineError::InvalidRequest { .. } => "invalid_request",
            PipelineError::UnknownStyle(_) => "unknown_style",
            PipelineError::InvalidKey { .. } => "invalid_key",
            PipelineError::Decode { .. } => "decode_error",
            PipelineError::Quantization { .. } => "quantization_error",
            PipelineError::Encode { .. } => "encode_error",
            PipelineError::Upload(_) => "upload_error",
            PipelineError::VerificationFailed { .. } => "verification_failed",
            PipelineError::Forbidden { .. } => "forbidden",
            PipelineError::Cancelled => "cancelled",
            PipelineError::TempArtifact { .. } => "temp_artifact_error",
            PipelineError::Internal { .. } => "internal_error",
        }
    }

    /// Whether the failure was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedMediaType { .. }
                | PipelineError::PayloadTooLarge { .. }
                | PipelineError::BatchTooLarge { .. }
                | PipelineError::InvalidRequest { .. }
                | PipelineError::UnknownStyle(_)
                | PipelineError::InvalidKey { .. }
                | PipelineError::Decode { .. }
                | PipelineError::Forbidden { .. }
        )
    }
}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Decode { message } => PipelineError::Decode { message },
            TransformError::Quantization { reason } => PipelineError::Quantization { reason },
            TransformError::InvalidRaster { reason } => PipelineError::Quantization { reason },
            TransformError::Encode { message } => PipelineError::Encode { message },
            TransformError::InvalidProfile { name, reason } => PipelineError::Internal {
                message: format!("style '{}' is misconfigured: {}", name, reason),
            },
            TransformError::Cancelled { .. } => PipelineError::Cancelled,
        }
    }
}

impl From<GatewayError> for PipelineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Store(store_err) => PipelineError::Upload(store_err),
            GatewayError::VerificationFailed { key } => PipelineError::VerificationFailed { key },
            GatewayError::InvalidKey { key, reason } => PipelineError::InvalidKey { key, reason },
        }
    }
}

// =============================================================================
// Pipeline Stage and Failure
// =============================================================================

/// Lifecycle state of a single request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Decoding,
    Transforming,
    Uploading,
    Verifying,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoding => "decoding",
            Stage::Transforming => "transforming",
            Stage::Uploading => "uploading",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EngineStage> for Stage {
    fn from(stage: EngineStage) -> Self {
        match stage {
            EngineStage::Decode => Stage::Decoding,
            _ => Stage::Transforming,
        }
    }
}

/// Terminal `Failed(stage, cause)` state of a request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineFailure {
    /// The stage that was active when the request failed
    pub stage: Stage,

    /// The underlying cause
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, error: impl Into<PipelineError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}
