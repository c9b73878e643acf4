//! The transformation engine.
//!
//! Runs the fixed stage sequence for one style profile:
//!
//! ```text
//! source bytes
//!     │ decode          (ImageCodec)
//!     ▼
//! RasterImage ── fit_canvas ── adjust_color ── pixelate ── quantize
//!                                                             │ encode
//!                                                             ▼
//!                                                       EncodedImage (PNG)
//! ```
//!
//! The engine is pure CPU work with no I/O and no shared mutable state. The
//! same bytes and profile always produce byte-identical output.

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::error::{EngineStage, TransformError};
use crate::pipeline::CancelToken;
use crate::style::StyleProfile;

use super::adjust::adjust_color;
use super::codec::{ImageCodec, OUTPUT_CONTENT_TYPE};
use super::quantize::Quantizer;
use super::resample::{fit_canvas, PixelResampler};

// =============================================================================
// Encoded Image
// =============================================================================

/// Final output of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// PNG bytes
    pub bytes: Bytes,

    /// Output width (equals the profile's canvas size)
    pub width: u32,

    /// Output height (equals the profile's canvas size)
    pub height: u32,

    /// Number of colors in the written palette
    pub palette_len: usize,

    /// MIME type of `bytes`
    pub content_type: &'static str,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An engine error tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage}: {error}")]
pub struct EngineFailure {
    pub stage: EngineStage,

    #[source]
    pub error: TransformError,
}

impl EngineFailure {
    fn at(stage: EngineStage) -> impl FnOnce(TransformError) -> Self {
        move |error| Self { stage, error }
    }
}

// =============================================================================
// Transform Engine
// =============================================================================

/// Stateless style transformation engine.
///
/// # Example
///
/// ```ignore
/// use retropix::style::GAMEBOY;
/// use retropix::transform::TransformEngine;
///
/// let engine = TransformEngine::new();
/// let output = engine.transform(&jpeg_bytes, &GAMEBOY)?;
/// assert_eq!((output.width, output.height), (160, 160));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    codec: ImageCodec,
    resampler: PixelResampler,
    quantizer: Quantizer,
}

impl TransformEngine {
    pub fn new() -> Self {
        Self {
            codec: ImageCodec::new(),
            resampler: PixelResampler::new(),
            quantizer: Quantizer::new(),
        }
    }

    /// Run every stage for `profile` over `source`.
    pub fn transform(
        &self,
        source: &[u8],
        profile: &StyleProfile,
    ) -> Result<EncodedImage, TransformError> {
        self.run(source, profile, None).map_err(|f| f.error)
    }

    /// Like [`transform`](Self::transform), but checks `cancel` before every
    /// stage and reports which stage failed.
    pub fn transform_checked(
        &self,
        source: &[u8],
        profile: &StyleProfile,
        cancel: &CancelToken,
    ) -> Result<EncodedImage, EngineFailure> {
        self.run(source, profile, Some(cancel))
    }

    fn run(
        &self,
        source: &[u8],
        profile: &StyleProfile,
        cancel: Option<&CancelToken>,
    ) -> Result<EncodedImage, EngineFailure> {
        let checkpoint = |stage: EngineStage| -> Result<(), EngineFailure> {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(EngineFailure {
                    stage,
                    error: TransformError::Cancelled { stage },
                });
            }
            trace!(style = profile.name, stage = %stage, "Engine stage");
            Ok(())
        };

        profile
            .validate()
            .map_err(EngineFailure::at(EngineStage::Decode))?;

        checkpoint(EngineStage::Decode)?;
        let raster = self
            .codec
            .decode(source)
            .map_err(EngineFailure::at(EngineStage::Decode))?;

        checkpoint(EngineStage::FitCanvas)?;
        let raster = fit_canvas(raster, profile.canvas_size)
            .map_err(EngineFailure::at(EngineStage::FitCanvas))?;

        checkpoint(EngineStage::AdjustColor)?;
        let raster = adjust_color(raster, profile.saturation_factor, profile.brightness_factor);

        checkpoint(EngineStage::Pixelate)?;
        let raster = self
            .resampler
            .pixelate(raster, profile.pixel_grid_size, profile.canvas_size)
            .map_err(EngineFailure::at(EngineStage::Pixelate))?;

        checkpoint(EngineStage::Quantize)?;
        let quantized = self
            .quantizer
            .quantize(&raster, profile.palette_size, profile.dither_strength)
            .map_err(EngineFailure::at(EngineStage::Quantize))?;

        checkpoint(EngineStage::Encode)?;
        let bytes = self
            .codec
            .encode(&quantized)
            .map_err(EngineFailure::at(EngineStage::Encode))?;

        Ok(EncodedImage {
            bytes,
            width: quantized.width(),
            height: quantized.height(),
            palette_len: quantized.len(),
            content_type: OUTPUT_CONTENT_TYPE,
        })
    }
}

// =============================================================================
// Transformer Trait
// =============================================================================

/// The transformation seam used by the pipeline.
///
/// Implementations run on the blocking pool and must be thread-safe.
/// [`TransformEngine`] is the production implementation.
pub trait ImageTransformer: Send + Sync {
    /// Transform `source` for `profile`, observing `cancel` between stages.
    fn transform_checked(
        &self,
        source: &[u8],
        profile: &StyleProfile,
        cancel: &CancelToken,
    ) -> Result<EncodedImage, EngineFailure>;
}

impl ImageTransformer for TransformEngine {
    fn transform_checked(
        &self,
        source: &[u8],
        profile: &StyleProfile,
        cancel: &CancelToken,
    ) -> Result<EncodedImage, EngineFailure> {
        self.run(source, profile, Some(cancel))
    }
}
