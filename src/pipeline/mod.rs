//! Request pipeline.
//!
//! The [`Pipeline`] validates image requests, runs the transformation engine,
//! uploads and verifies the result, and cleans up after itself:
//!
//! - [`ImageRequest`] / [`ProcessedImage`] / [`ErrorResponse`]: boundary types
//! - [`TempArtifact`]: request-owned spool file
//! - [`CancelToken`]: cooperative cancellation
//! - [`MediaType`]: the upload allow-list

mod artifact;
mod cancel;
mod media;
mod orchestrator;
mod request;

pub use artifact::{TempArtifact, ARTIFACT_PREFIX};
pub use cancel::CancelToken;
pub use media::{extension_of, resolve_media, MediaType};
pub use orchestrator::{
    Pipeline, PipelineConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_UPLOAD_RETRIES,
};
pub use request::{
    random_token, BatchFailure, BatchReport, ErrorResponse, ImageRequest, KeyStrategy, OwnedImage,
    ProcessedImage,
};
