//! Saturation and brightness adjustment.
//!
//! Saturation scales each channel's distance from the pixel's Rec.601 luma
//! (0 gives grayscale, 1 is identity, above 1 amplifies). Brightness then
//! multiplies all three color channels. Results are rounded and clamped to
//! `0..=255`; alpha is left untouched.

use super::raster::RasterImage;

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Apply saturation and brightness factors, consuming the input buffer.
///
/// Negative factors are treated as zero.
pub fn adjust_color(image: RasterImage, saturation: f32, brightness: f32) -> RasterImage {
    let saturation = saturation.max(0.0);
    let brightness = brightness.max(0.0);

    let mut image = image;
    if saturation == 1.0 && brightness == 1.0 {
        return image;
    }

    let channels = image.channels();
    for px in image.as_bytes_mut().chunks_exact_mut(channels) {
        let r = px[0] as f32;
        let g = px[1] as f32;
        let b = px[2] as f32;
        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;

        px[0] = scale_channel(r, luma, saturation, brightness);
        px[1] = scale_channel(g, luma, saturation, brightness);
        px[2] = scale_channel(b, luma, saturation, brightness);
    }

    image
}

#[inline]
fn scale_channel(value: f32, luma: f32, saturation: f32, brightness: f32) -> u8 {
    let saturated = luma + (value - luma) * saturation;
    (saturated * brightness).round().clamp(0.0, 255.0) as u8
}
