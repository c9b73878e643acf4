//! # retropix
//!
//! Retro pixel-art transforms for photos, published to object storage.
//!
//! This library turns an uploaded photo into a small, palette-limited image
//! in one of a fixed set of retro styles and stores it under a stable public
//! URL. Every result is deterministic: the same bytes and style always
//! produce the same PNG.
//!
//! ## Features
//!
//! - **Retro styles**: GameBoy, 8-bit, NES and an extreme low-grid look
//! - **Palette quantization**: median cut with optional Floyd-Steinberg dithering
//! - **Indexed PNG output**: one palette entry per output color
//! - **Verified uploads**: every write is read back before a URL is returned
//! - **Guaranteed cleanup**: temporary files are removed on every exit path
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`transform`] - Decoding, resampling, color adjustment, quantization, encoding
//! - [`style`] - Style profiles and the style registry
//! - [`store`] - Object store backends and the upload gateway
//! - [`pipeline`] - Request validation, orchestration and cleanup
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error taxonomy shared by all layers
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use retropix::{
//!     CancelToken, ImageRequest, LocalDirStore, ObjectStoreGateway, Pipeline, PipelineConfig,
//!     PublicUrlBuilder, StyleRegistry, TransformEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = LocalDirStore::new("./uploads").await?;
//!     let urls = PublicUrlBuilder::new("http://localhost:3000/api/images")?;
//!     let pipeline = Pipeline::new(
//!         StyleRegistry::new()?,
//!         TransformEngine::new(),
//!         ObjectStoreGateway::new(store, urls),
//!         PipelineConfig::default(),
//!     );
//!
//!     let bytes = Bytes::from(std::fs::read("cat.jpg")?);
//!     let request = ImageRequest::new(bytes, "cat.jpg", "image/jpeg", "user-1", "gameboy");
//!     let processed = pipeline.process(request, &CancelToken::new()).await?;
//!     println!("{}", processed.public_url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod style;
pub mod transform;

// Re-export commonly used types
pub use config::{Cli, Command, PipelineArgs, StoreArgs, StoreKind};
pub use error::{
    EngineStage, GatewayError, PipelineError, PipelineFailure, Stage, StoreError, StyleError,
    TransformError,
};
pub use pipeline::{
    BatchFailure, BatchReport, CancelToken, ErrorResponse, ImageRequest, KeyStrategy, MediaType,
    OwnedImage, Pipeline, PipelineConfig, ProcessedImage, TempArtifact,
};
pub use store::{
    create_s3_client, LocalDirStore, ObjectStore, ObjectStoreGateway, PublicUrlBuilder, S3Store,
    StorageObject, StoredObjectInfo, UploadResult,
};
pub use style::{Style, StyleProfile, StyleRegistry};
pub use transform::{
    EncodedImage, ImageCodec, ImageTransformer, PixelResampler, QuantizedPalette, Quantizer,
    RasterImage, TransformEngine,
};
