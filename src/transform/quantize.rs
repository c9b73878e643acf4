//! Deterministic palette quantization.
//!
//! The quantizer builds an exact color histogram, then either keeps every
//! distinct color (when there are few enough) or reduces them with a weighted
//! median cut. Pixels are mapped to the nearest palette entry, optionally with
//! Floyd-Steinberg error diffusion scaled by the dither strength.
//!
//! Identical input and parameters always produce an identical palette and
//! index buffer: the histogram is sorted, sorts are stable, and every tie is
//! broken by position.

use std::collections::HashMap;

use crate::error::TransformError;

use super::raster::RasterImage;

/// Largest palette a PNG `PLTE` chunk can hold.
pub const MAX_PALETTE_SIZE: usize = 256;

// =============================================================================
// Quantized Palette
// =============================================================================

/// A palette plus one index per pixel.
///
/// The palette never exceeds the requested size, contains no duplicate
/// entries, and every index is a valid position in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedPalette {
    width: u32,
    height: u32,
    palette: Vec<[u8; 4]>,
    indices: Vec<u8>,
}

impl QuantizedPalette {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA palette entries.
    pub fn palette(&self) -> &[[u8; 4]] {
        &self.palette
    }

    /// Palette index of each pixel in row-major order.
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    /// Whether any palette entry is not fully opaque.
    pub fn has_translucency(&self) -> bool {
        self.palette.iter().any(|c| c[3] != 255)
    }

    /// Color of the pixel at `(x, y)`.
    pub fn color_at(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = self.indices[y as usize * self.width as usize + x as usize];
        self.palette[idx as usize]
    }

    /// Drop palette entries no pixel refers to, keeping the relative order.
    fn compact(mut self) -> Self {
        let mut used = vec![false; self.palette.len()];
        for &idx in &self.indices {
            used[idx as usize] = true;
        }
        if used.iter().all(|u| *u) {
            return self;
        }

        let mut remap = vec![0u8; self.palette.len()];
        let mut palette = Vec::with_capacity(self.palette.len());
        for (old, color) in self.palette.iter().enumerate() {
            if used[old] {
                remap[old] = palette.len() as u8;
                palette.push(*color);
            }
        }
        for idx in self.indices.iter_mut() {
            *idx = remap[*idx as usize];
        }
        self.palette = palette;
        self
    }
}

// =============================================================================
// Histogram
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct ColorCount {
    rgba: [u8; 4],
    count: u64,
}

#[inline]
fn pack(c: [u8; 4]) -> u32 {
    u32::from_be_bytes(c)
}

/// Distinct colors sorted by packed RGBA value.
fn histogram(image: &RasterImage) -> Vec<ColorCount> {
    let mut keys: Vec<u32> = image.rgba_pixels().map(pack).collect();
    keys.sort_unstable();

    let mut colors: Vec<ColorCount> = Vec::new();
    for key in keys {
        match colors.last_mut() {
            Some(last) if pack(last.rgba) == key => last.count += 1,
            _ => colors.push(ColorCount {
                rgba: key.to_be_bytes(),
                count: 1,
            }),
        }
    }
    colors
}

// =============================================================================
// Median Cut
// =============================================================================

#[derive(Debug, Clone)]
struct ColorBox {
    colors: Vec<ColorCount>,
    min: [u8; 4],
    max: [u8; 4],
}

impl ColorBox {
    fn from_colors(colors: Vec<ColorCount>) -> Self {
        let mut min = [255u8; 4];
        let mut max = [0u8; 4];
        for c in &colors {
            for ch in 0..4 {
                min[ch] = min[ch].min(c.rgba[ch]);
                max[ch] = max[ch].max(c.rgba[ch]);
            }
        }
        Self { colors, min, max }
    }

    /// Channel with the widest spread and that spread. Earlier channels win ties.
    fn widest_channel(&self) -> (usize, u8) {
        let mut channel = 0;
        let mut range = self.max[0] - self.min[0];
        for ch in 1..4 {
            let r = self.max[ch] - self.min[ch];
            if r > range {
                range = r;
                channel = ch;
            }
        }
        (channel, range)
    }

    fn weight(&self) -> u64 {
        self.colors.iter().map(|c| c.count).sum()
    }

    /// Split at the weighted median of the widest channel.
    ///
    /// Both halves are non-empty; callers only split boxes with 2+ colors.
    fn split(self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        let mut colors = self.colors;
        colors.sort_by_key(|c| c.rgba[channel]);

        let total: u64 = colors.iter().map(|c| c.count).sum();
        let mut acc = 0;
        let mut split_idx = 0;
        for (i, c) in colors.iter().enumerate() {
            acc += c.count;
            if acc * 2 >= total {
                split_idx = i;
                break;
            }
        }
        split_idx = split_idx.min(colors.len() - 2);

        let right = colors.split_off(split_idx + 1);
        (ColorBox::from_colors(colors), ColorBox::from_colors(right))
    }

    /// Count-weighted mean color, rounded to nearest.
    fn mean(&self) -> [u8; 4] {
        let mut sums = [0u64; 4];
        let mut total = 0u64;
        for c in &self.colors {
            for ch in 0..4 {
                sums[ch] += c.rgba[ch] as u64 * c.count;
            }
            total += c.count;
        }
        if total == 0 {
            return [0, 0, 0, 255];
        }
        let mut out = [0u8; 4];
        for ch in 0..4 {
            out[ch] = ((sums[ch] + total / 2) / total) as u8;
        }
        out
    }
}

/// Reduce `colors` to at most `max_colors` representative entries.
///
/// Entries are ordered by the pixel weight they represent (heaviest first),
/// then by packed color value. Boxes whose means coincide are merged.
fn median_cut(colors: Vec<ColorCount>, max_colors: usize) -> Vec<[u8; 4]> {
    let mut boxes = vec![ColorBox::from_colors(colors)];

    while boxes.len() < max_colors {
        let mut best: Option<(usize, u8)> = None;
        for (i, b) in boxes.iter().enumerate() {
            if b.colors.len() < 2 {
                continue;
            }
            let (_, range) = b.widest_channel();
            if best.map_or(true, |(_, r)| range > r) {
                best = Some((i, range));
            }
        }

        let Some((idx, _)) = best else {
            break;
        };
        let (left, right) = boxes.remove(idx).split();
        boxes.insert(idx, right);
        boxes.insert(idx, left);
    }

    let mut entries: Vec<([u8; 4], u64)> = Vec::with_capacity(boxes.len());
    for b in &boxes {
        let mean = b.mean();
        let weight = b.weight();
        match entries.iter_mut().find(|(c, _)| *c == mean) {
            Some(existing) => existing.1 += weight,
            None => entries.push((mean, weight)),
        }
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(pack(a.0).cmp(&pack(b.0))));
    entries.into_iter().map(|(c, _)| c).collect()
}

// =============================================================================
// Mapping
// =============================================================================

/// Index of the closest palette entry by squared RGBA distance.
///
/// The lowest index wins ties.
#[inline]
fn nearest_index(color: [i32; 4], palette: &[[u8; 4]]) -> u8 {
    let mut best_idx = 0usize;
    let mut best_dist = i64::MAX;
    for (i, p) in palette.iter().enumerate() {
        let mut dist = 0i64;
        for ch in 0..4 {
            let d = (color[ch] - p[ch] as i32) as i64;
            dist += d * d;
        }
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx as u8
}

#[inline]
fn widen(c: [u8; 4]) -> [i32; 4] {
    [c[0] as i32, c[1] as i32, c[2] as i32, c[3] as i32]
}

/// Map each pixel to its nearest entry with no error diffusion.
fn map_nearest(image: &RasterImage, palette: &[[u8; 4]]) -> Vec<u8> {
    let mut cache: HashMap<u32, u8> = HashMap::new();
    image
        .rgba_pixels()
        .map(|px| {
            *cache
                .entry(pack(px))
                .or_insert_with(|| nearest_index(widen(px), palette))
        })
        .collect()
}

/// Floyd-Steinberg error diffusion in raster order, scaled by `strength`.
///
/// Error is diffused over the color channels only; alpha is matched as-is.
fn map_dithered(image: &RasterImage, palette: &[[u8; 4]], strength: f32) -> Vec<u8> {
    let width = image.width() as usize;
    let mut indices = Vec::with_capacity(image.pixel_count());

    // Row buffers padded by one pixel on each side.
    let mut current = vec![[0f32; 3]; width + 2];
    let mut next = vec![[0f32; 3]; width + 2];

    for y in 0..image.height() {
        for x in 0..width {
            let px = image.rgba_at(x as u32, y);
            let err = current[x + 1];

            let mut adjusted = [0i32; 4];
            for ch in 0..3 {
                adjusted[ch] = (px[ch] as f32 + err[ch]).round().clamp(0.0, 255.0) as i32;
            }
            adjusted[3] = px[3] as i32;

            let idx = nearest_index(adjusted, palette);
            indices.push(idx);

            let chosen = palette[idx as usize];
            for ch in 0..3 {
                let e = (adjusted[ch] - chosen[ch] as i32) as f32 * strength;
                current[x + 2][ch] += e * 7.0 / 16.0;
                next[x][ch] += e * 3.0 / 16.0;
                next[x + 1][ch] += e * 5.0 / 16.0;
                next[x + 2][ch] += e * 1.0 / 16.0;
            }
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|e| *e = [0.0; 3]);
    }

    indices
}

// =============================================================================
// Quantizer
// =============================================================================

/// Color quantizer producing at most `palette_size` colors.
#[derive(Debug, Clone, Default)]
pub struct Quantizer {}

impl Quantizer {
    pub fn new() -> Self {
        Self {}
    }

    /// Quantize `image` to at most `palette_size` colors.
    ///
    /// `dither_strength` is clamped to `0.0..=1.0`; zero maps every pixel to
    /// its nearest palette color with no error diffusion.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::Quantization` if the image has no pixels or
    /// `palette_size` is outside `1..=256`. Color diversity never fails.
    pub fn quantize(
        &self,
        image: &RasterImage,
        palette_size: usize,
        dither_strength: f32,
    ) -> Result<QuantizedPalette, TransformError> {
        if image.is_empty() {
            return Err(TransformError::Quantization {
                reason: "image has zero size".to_string(),
            });
        }
        if palette_size == 0 || palette_size > MAX_PALETTE_SIZE {
            return Err(TransformError::Quantization {
                reason: format!(
                    "palette size {} must be within 1..={}",
                    palette_size, MAX_PALETTE_SIZE
                ),
            });
        }

        let colors = histogram(image);

        if colors.len() <= palette_size {
            return Ok(exact_palette(image, colors));
        }

        let palette = median_cut(colors, palette_size);
        let strength = if dither_strength.is_finite() {
            dither_strength.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let indices = if strength > 0.0 {
            map_dithered(image, &palette, strength)
        } else {
            map_nearest(image, &palette)
        };

        Ok(QuantizedPalette {
            width: image.width(),
            height: image.height(),
            palette,
            indices,
        }
        .compact())
    }
}

/// Palette made of exactly the distinct colors present, heaviest first.
fn exact_palette(image: &RasterImage, mut colors: Vec<ColorCount>) -> QuantizedPalette {
    colors.sort_by(|a, b| b.count.cmp(&a.count).then(pack(a.rgba).cmp(&pack(b.rgba))));

    let lookup: HashMap<u32, u8> = colors
        .iter()
        .enumerate()
        .map(|(i, c)| (pack(c.rgba), i as u8))
        .collect();

    let indices = image
        .rgba_pixels()
        .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
        .collect();

    QuantizedPalette {
        width: image.width(),
        height: image.height(),
        palette: colors.into_iter().map(|c| c.rgba).collect(),
        indices,
    }
}
