//! Source decoding and palette-indexed PNG encoding.
//!
//! # Design Decisions
//!
//! - **Format sniffing**: the container format is guessed from magic bytes,
//!   never trusted from the file name. Inputs the codec stack cannot read
//!   (HEIC/HEIF among them) fail as decode errors.
//!
//! - **Orientation**: EXIF orientation is applied at decode time so phone
//!   photos come out upright before cropping.
//!
//! - **No encode-time filtering**: PNG row filters are disabled so the output
//!   is a plain indexed image; nothing at this stage may alter pixel values.

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageDecoder, ImageReader, Limits};

use crate::error::TransformError;

use super::quantize::QuantizedPalette;
use super::raster::RasterImage;

/// Largest accepted source width or height in pixels.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Upper bound on decoder allocations (256MB).
pub const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// Content type of every encoded output.
pub const OUTPUT_CONTENT_TYPE: &str = "image/png";

/// File extension of every encoded output.
pub const OUTPUT_EXTENSION: &str = "png";

// =============================================================================
// Image Codec
// =============================================================================

/// Decoder for source photos and encoder for quantized output.
///
/// # Example
///
/// ```ignore
/// use retropix::transform::ImageCodec;
///
/// let codec = ImageCodec::new();
/// let raster = codec.decode(&jpeg_bytes)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ImageCodec {}

impl ImageCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self {}
    }

    /// Decode source bytes into an RGB or RGBA raster.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Decode` if:
    /// - The input is empty
    /// - The format is not recognized or not supported
    /// - The data is malformed or exceeds the decode limits
    pub fn decode(&self, source: &[u8]) -> Result<RasterImage, TransformError> {
        if source.is_empty() {
            return Err(TransformError::Decode {
                message: "input is empty".to_string(),
            });
        }

        let format = image::guess_format(source).map_err(|e| TransformError::Decode {
            message: format!("unrecognized or unsupported format: {}", e),
        })?;

        let mut reader = ImageReader::with_format(Cursor::new(source), format);
        reader.limits(decode_limits());

        let mut decoder = reader.into_decoder().map_err(decode_error)?;
        let orientation = decoder.orientation().map_err(decode_error)?;
        let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
        img.apply_orientation(orientation);

        Ok(RasterImage::from(img))
    }

    /// Encode a quantized palette as an 8-bit indexed PNG.
    ///
    /// Row filtering is disabled; a `tRNS` chunk is written only when some
    /// palette entry is translucent.
    pub fn encode(&self, quantized: &QuantizedPalette) -> Result<Bytes, TransformError> {
        if quantized.is_empty() {
            return Err(TransformError::Encode {
                message: "palette is empty".to_string(),
            });
        }

        let palette: Vec<u8> = quantized
            .palette()
            .iter()
            .flat_map(|c| [c[0], c[1], c[2]])
            .collect();

        let mut output = Vec::new();
        {
            let mut encoder =
                png::Encoder::new(&mut output, quantized.width(), quantized.height());
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(palette);
            if quantized.has_translucency() {
                let trns: Vec<u8> = quantized.palette().iter().map(|c| c[3]).collect();
                encoder.set_trns(trns);
            }
            encoder.set_compression(png::Compression::Best);
            encoder.set_filter(png::FilterType::NoFilter);
            encoder.set_adaptive_filter(png::AdaptiveFilterType::NonAdaptive);

            let mut writer = encoder.write_header().map_err(encode_error)?;
            writer
                .write_image_data(quantized.indices())
                .map_err(encode_error)?;
            writer.finish().map_err(encode_error)?;
        }

        Ok(Bytes::from(output))
    }
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

fn decode_error(e: image::ImageError) -> TransformError {
    TransformError::Decode {
        message: e.to_string(),
    }
}

fn encode_error(e: png::EncodingError) -> TransformError {
    TransformError::Encode {
        message: e.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
