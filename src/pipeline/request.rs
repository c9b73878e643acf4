use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, PipelineFailure, Stage};

// =============================================================================
// Request
// =============================================================================

/// One image submitted for processing.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Raw uploaded bytes
    pub source_bytes: Bytes,

    /// File name as sent by the client
    pub original_filename: String,

    /// Declared MIME type
    pub mime_type: String,

    /// Authenticated owner of the upload
    pub owner_id: String,

    /// Style name, resolved against the registry
    pub style: String,

    /// Caller-chosen storage key; generated when absent
    pub target_key: Option<String>,
}

impl ImageRequest {
    pub fn new(
        source_bytes: Bytes,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
        owner_id: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            source_bytes,
            original_filename: original_filename.into(),
            mime_type: mime_type.into(),
            owner_id: owner_id.into(),
            style: style.into(),
            target_key: None,
        }
    }

    /// Store the output under `key` instead of a generated one.
    pub fn with_target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Successful outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub public_url: String,
    pub storage_key: String,
    pub original_name: String,
    pub size_bytes: u64,
}

/// Normalized failure body.
///
/// Mirrors the shape callers already receive from the upload API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Stable error identifier (e.g. `"unknown_style"`)
    pub kind: String,

    /// Human-readable message
    pub message: String,

    /// Stage that was active when the request failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            stage: None,
        }
    }
}

impl From<&PipelineFailure> for ErrorResponse {
    fn from(failure: &PipelineFailure) -> Self {
        Self {
            kind: failure.kind().to_string(),
            message: failure.error.to_string(),
            stage: Some(failure.stage),
        }
    }
}

/// A failed item inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub original_name: String,
    pub error: ErrorResponse,
}

/// Per-item outcome of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<ProcessedImage>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An object listed under an owner's prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedImage {
    pub name: String,
    pub storage_key: String,
    pub public_url: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
}

// =============================================================================
// Key Strategy
// =============================================================================

/// How generated storage keys are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Fresh random 128-bit token per request
    #[default]
    Random,

    /// Hash of the source bytes, so resubmitting the same image for the same
    /// style overwrites the earlier output
    ContentHash,
}

impl KeyStrategy {
    /// Token identifying one upload of `source`.
    pub fn token(&self, source: &[u8]) -> String {
        match self {
            KeyStrategy::Random => random_token(),
            KeyStrategy::ContentHash => {
                let digest = Sha256::digest(source);
                hex::encode(&digest[..16])
            }
        }
    }

    /// Key for a transformed output: `<prefix>_<token>.<ext>`.
    pub fn output_key(&self, prefix: &str, source: &[u8], extension: &str) -> String {
        format!("{}_{}.{}", prefix, self.token(source), extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStrategy::Random => "random",
            KeyStrategy::ContentHash => "content-hash",
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(KeyStrategy::Random),
            "content-hash" => Ok(KeyStrategy::ContentHash),
            other => Err(format!(
                "unknown key strategy '{}' (expected 'random' or 'content-hash')",
                other
            )),
        }
    }
}

/// 32 lowercase hex characters from a random 128-bit value.
pub fn random_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}
