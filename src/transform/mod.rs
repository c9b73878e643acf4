//! Image transformation.
//!
//! This module turns arbitrary source photos into palette-limited,
//! pixel-block PNGs:
//!
//! - [`ImageCodec`]: format-sniffing decoder and indexed PNG encoder
//! - [`fit_canvas`] / [`PixelResampler`]: cover-crop and block resampling
//! - [`adjust_color`]: saturation and brightness
//! - [`Quantizer`]: median-cut palette with optional error diffusion
//! - [`TransformEngine`]: runs the stages in their fixed order
//! - [`ImageTransformer`]: the seam the pipeline calls the engine through

pub mod adjust;
pub mod codec;
pub mod engine;
pub mod quantize;
pub mod raster;
pub mod resample;

pub use adjust::adjust_color;
pub use codec::{ImageCodec, OUTPUT_CONTENT_TYPE, OUTPUT_EXTENSION};
pub use engine::{EncodedImage, EngineFailure, ImageTransformer, TransformEngine};
pub use quantize::{QuantizedPalette, Quantizer, MAX_PALETTE_SIZE};
pub use raster::{ColorLayout, RasterImage};
pub use resample::{fit_canvas, nearest_neighbor, PixelResampler};
