//! Canvas fitting and two-stage nearest-neighbor pixelation.
//!
//! # Design Decisions
//!
//! - **Cover, not contain**: the canonical canvas is always filled. The
//!   longer edge is cropped equally from both sides down to a centered square,
//!   which is then scaled to the canvas. Memory stays bounded by the source and
//!   the canvas whatever the aspect ratio.
//!
//! - **Two nearest-neighbor passes**: pixelation samples down to the grid and
//!   back up to the canvas without blending. A single resize to the grid
//!   would average neighboring colors and soften block edges.
//!
//! - **Sample centers**: output pixel `x` reads source pixel
//!   `floor((2x + 1) * src / (2 * dst))`. When the canvas is a multiple of the
//!   grid, every block is exactly `canvas / grid` pixels wide.

use image::imageops::FilterType;

use crate::error::TransformError;

use super::raster::RasterImage;

/// Filter used for the continuous-tone cover resize before pixelation.
const CANVAS_FILTER: FilterType = FilterType::Lanczos3;

// =============================================================================
// Canvas Fitting
// =============================================================================

/// Scale and center-crop `image` to a `size` x `size` square.
pub fn fit_canvas(image: RasterImage, size: u32) -> Result<RasterImage, TransformError> {
    if image.is_empty() {
        return Err(TransformError::InvalidRaster {
            reason: "cannot fit an empty image to the canvas".to_string(),
        });
    }
    if size == 0 {
        return Err(TransformError::InvalidRaster {
            reason: "canvas size must be greater than 0".to_string(),
        });
    }

    let (width, height) = (image.width(), image.height());
    if width == size && height == size {
        return Ok(image);
    }

    let (x, y, side) = centered_square(width, height);
    let cropped = image
        .into_dynamic()
        .crop_imm(x, y, side, side)
        .resize_exact(size, size, CANVAS_FILTER);

    Ok(RasterImage::from(cropped))
}

/// Largest centered square inside a `width` x `height` image, as
/// `(x, y, side)`.
pub fn centered_square(width: u32, height: u32) -> (u32, u32, u32) {
    let side = width.min(height);
    ((width - side) / 2, (height - side) / 2, side)
}

// =============================================================================
// Nearest Neighbor
// =============================================================================

/// Source index sampled for destination index `dst_index`.
#[inline]
fn nearest_index(dst_index: u32, src_len: u32, dst_len: u32) -> usize {
    let idx = ((2 * dst_index as u64 + 1) * src_len as u64) / (2 * dst_len as u64);
    idx.min(src_len as u64 - 1) as usize
}

/// Resize with nearest-neighbor sampling, producing a new buffer.
pub fn nearest_neighbor(
    image: &RasterImage,
    dst_width: u32,
    dst_height: u32,
) -> Result<RasterImage, TransformError> {
    if image.is_empty() || dst_width == 0 || dst_height == 0 {
        return Err(TransformError::InvalidRaster {
            reason: format!(
                "cannot resample {}x{} to {}x{}",
                image.width(),
                image.height(),
                dst_width,
                dst_height
            ),
        });
    }

    let channels = image.channels();
    let src_width = image.width() as usize;
    let src = image.as_bytes();

    let columns: Vec<usize> = (0..dst_width)
        .map(|x| nearest_index(x, image.width(), dst_width))
        .collect();

    let mut out = RasterImage::blank(dst_width, dst_height, image.layout());
    let row_len = dst_width as usize * channels;

    for (y, row) in out.as_bytes_mut().chunks_exact_mut(row_len).enumerate() {
        let src_y = nearest_index(y as u32, image.height(), dst_height);
        let src_row = &src[src_y * src_width * channels..(src_y + 1) * src_width * channels];

        for (dst_px, &src_x) in row.chunks_exact_mut(channels).zip(&columns) {
            dst_px.copy_from_slice(&src_row[src_x * channels..(src_x + 1) * channels]);
        }
    }

    Ok(out)
}

// =============================================================================
// Pixel Resampler
// =============================================================================

/// Two-stage nearest-neighbor resampler that produces uniform pixel blocks.
#[derive(Debug, Clone, Default)]
pub struct PixelResampler {}

impl PixelResampler {
    pub fn new() -> Self {
        Self {}
    }

    /// Down-sample to `grid` x `grid`, then up-sample to `canvas` x `canvas`.
    pub fn pixelate(
        &self,
        image: RasterImage,
        grid: u32,
        canvas: u32,
    ) -> Result<RasterImage, TransformError> {
        if grid == 0 || grid > canvas {
            return Err(TransformError::InvalidRaster {
                reason: format!("pixel grid {} must be within 1..={}", grid, canvas),
            });
        }

        let down = nearest_neighbor(&image, grid, grid)?;
        nearest_neighbor(&down, canvas, canvas)
    }
}
