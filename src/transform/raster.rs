//! Owned raster buffers passed between engine stages.

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::error::TransformError;

/// Pixel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLayout {
    Rgb,
    Rgba,
}

impl ColorLayout {
    /// Number of bytes per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        match self {
            ColorLayout::Rgb => 3,
            ColorLayout::Rgba => 4,
        }
    }
}

/// An owned 2-D grid of RGB or RGBA pixels.
///
/// The buffer length always equals `width * height * channels`. Engine stages
/// take a `RasterImage` by value and return a new one, so a buffer is never
/// shared between two stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    layout: ColorLayout,
    data: Vec<u8>,
}

impl RasterImage {
    /// Wrap a pixel buffer, checking it against the declared geometry.
    pub fn new(
        width: u32,
        height: u32,
        layout: ColorLayout,
        data: Vec<u8>,
    ) -> Result<Self, TransformError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(layout.channels()))
            .ok_or_else(|| TransformError::InvalidRaster {
                reason: format!("{}x{} overflows the address space", width, height),
            })?;

        if data.len() != expected {
            return Err(TransformError::InvalidRaster {
                reason: format!(
                    "{}x{}x{} needs {} bytes, buffer has {}",
                    width,
                    height,
                    layout.channels(),
                    expected,
                    data.len()
                ),
            });
        }

        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Allocate a zero-filled image.
    pub fn blank(width: u32, height: u32, layout: ColorLayout) -> Self {
        let len = width as usize * height as usize * layout.channels();
        Self {
            width,
            height,
            layout,
            data: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ColorLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel at `(x, y)` widened to RGBA (opaque for RGB images).
    #[inline]
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let channels = self.channels();
        let idx = (y as usize * self.width as usize + x as usize) * channels;
        let px = &self.data[idx..idx + channels];
        match self.layout {
            ColorLayout::Rgb => [px[0], px[1], px[2], 255],
            ColorLayout::Rgba => [px[0], px[1], px[2], px[3]],
        }
    }

    /// Iterate over every pixel in row-major order, widened to RGBA.
    pub fn rgba_pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        let layout = self.layout;
        self.data
            .chunks_exact(layout.channels())
            .map(move |px| match layout {
                ColorLayout::Rgb => [px[0], px[1], px[2], 255],
                ColorLayout::Rgba => [px[0], px[1], px[2], px[3]],
            })
    }

    /// Convert into an `image` crate buffer for codec interop.
    pub fn into_dynamic(self) -> DynamicImage {
        match self.layout {
            ColorLayout::Rgb => RgbImage::from_raw(self.width, self.height, self.data)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(0, 0)),
            ColorLayout::Rgba => RgbaImage::from_raw(self.width, self.height, self.data)
                .map(DynamicImage::ImageRgba8)
                .unwrap_or_else(|| DynamicImage::new_rgba8(0, 0)),
        }
    }
}

impl From<DynamicImage> for RasterImage {
    /// Normalize any decoded image to 8-bit RGB, or RGBA when it carries alpha.
    fn from(img: DynamicImage) -> Self {
        if img.color().has_alpha() {
            let buf = img.into_rgba8();
            let (width, height) = buf.dimensions();
            Self {
                width,
                height,
                layout: ColorLayout::Rgba,
                data: buf.into_raw(),
            }
        } else {
            let buf = img.into_rgb8();
            let (width, height) = buf.dimensions();
            Self {
                width,
                height,
                layout: ColorLayout::Rgb,
                data: buf.into_raw(),
            }
        }
    }
}
