//! Engine invariants over generated sources.
//!
//! Tests verify, for arbitrary source sizes and colors:
//! - Output is always the style's square canvas
//! - The output palette never exceeds the style's palette size
//! - Undithered styles produce uniform pixel blocks
//! - The same input always produces the same bytes

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use proptest::prelude::*;

use retropix::style::Style;
use retropix::transform::{ColorLayout, PixelResampler, Quantizer, RasterImage, TransformEngine};

use super::test_utils::{blocks_are_uniform, decode_png, distinct_colors};

/// Pseudo-random but reproducible pixels for `seed`.
fn noisy_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed)
            .wrapping_mul(2_654_435_761);
        Rgb([(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8])
    });

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn any_style() -> impl Strategy<Value = Style> {
    prop::sample::select(Style::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_output_respects_style(
        width in 1u32..240,
        height in 1u32..240,
        seed in any::<u32>(),
        style in any_style(),
    ) {
        let profile = style.profile();
        let source = noisy_png(width, height, seed);

        let encoded = TransformEngine::new().transform(&source, profile).unwrap();
        prop_assert_eq!((encoded.width, encoded.height), (profile.canvas_size, profile.canvas_size));
        prop_assert!(encoded.palette_len <= profile.palette_size);

        let output = decode_png(&encoded.bytes);
        prop_assert_eq!(output.dimensions(), (profile.canvas_size, profile.canvas_size));
        prop_assert!(distinct_colors(&output).len() <= profile.palette_size);

        match profile.block_size() {
            Some(block) if profile.dither_strength == 0.0 => {
                prop_assert!(blocks_are_uniform(&output, block));
            }
            _ => {}
        }
    }

    #[test]
    fn test_transform_is_deterministic(
        width in 1u32..160,
        height in 1u32..160,
        seed in any::<u32>(),
        style in any_style(),
    ) {
        let source = noisy_png(width, height, seed);
        let engine = TransformEngine::new();

        let first = engine.transform(&source, style.profile()).unwrap();
        let second = engine.transform(&source, style.profile()).unwrap();
        prop_assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn test_quantizer_palette_bound(
        pixels in prop::collection::vec(any::<u8>(), 3 * 24 * 24),
        palette_size in 1usize..=64,
        dither in 0.0f32..=1.0,
    ) {
        let image = RasterImage::new(24, 24, ColorLayout::Rgb, pixels).unwrap();
        let quantized = Quantizer::new().quantize(&image, palette_size, dither).unwrap();

        prop_assert!(!quantized.is_empty());
        prop_assert!(quantized.len() <= palette_size);
        prop_assert_eq!(quantized.indices().len(), 24 * 24);
        prop_assert!(quantized.indices().iter().all(|&i| (i as usize) < quantized.len()));
    }

    #[test]
    fn test_pixelate_produces_square_canvas(
        width in 1u32..120,
        height in 1u32..120,
        grid in 1u32..=40,
    ) {
        let canvas = grid * 4;
        let image = RasterImage::blank(width, height, ColorLayout::Rgb);

        let out = PixelResampler::new().pixelate(image, grid, canvas).unwrap();
        prop_assert_eq!((out.width(), out.height()), (canvas, canvas));
    }
}
