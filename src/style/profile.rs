use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{StyleError, TransformError};
use crate::transform::quantize::MAX_PALETTE_SIZE;

// =============================================================================
// Style Profile
// =============================================================================

/// Immutable parameters for one retro style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleProfile {
    /// Registry name, also used as the generated key prefix
    pub name: &'static str,

    /// Side of the square output canvas in pixels
    pub canvas_size: u32,

    /// Side of the intermediate pixel grid
    pub pixel_grid_size: u32,

    /// Saturation multiplier (0 = grayscale, 1 = unchanged)
    pub saturation_factor: f32,

    /// Brightness multiplier (1 = unchanged)
    pub brightness_factor: f32,

    /// Maximum number of output colors
    pub palette_size: usize,

    /// Error diffusion strength in `0.0..=1.0`
    pub dither_strength: f32,
}

impl StyleProfile {
    /// Side of one output pixel block, when the canvas divides evenly.
    pub fn block_size(&self) -> Option<u32> {
        if self.pixel_grid_size > 0 && self.canvas_size % self.pixel_grid_size == 0 {
            Some(self.canvas_size / self.pixel_grid_size)
        } else {
            None
        }
    }

    /// Check that the profile can drive the engine.
    pub fn validate(&self) -> Result<(), TransformError> {
        let invalid = |reason: String| TransformError::InvalidProfile {
            name: self.name.to_string(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if self.canvas_size == 0 {
            return Err(invalid("canvas_size must be greater than 0".to_string()));
        }
        if self.pixel_grid_size == 0 || self.pixel_grid_size > self.canvas_size {
            return Err(invalid(format!(
                "pixel_grid_size {} must be within 1..={}",
                self.pixel_grid_size, self.canvas_size
            )));
        }
        if self.palette_size == 0 || self.palette_size > MAX_PALETTE_SIZE {
            return Err(invalid(format!(
                "palette_size {} must be within 1..={}",
                self.palette_size, MAX_PALETTE_SIZE
            )));
        }
        if !(self.saturation_factor.is_finite() && self.saturation_factor >= 0.0) {
            return Err(invalid("saturation_factor must be a non-negative number".to_string()));
        }
        if !(self.brightness_factor.is_finite() && self.brightness_factor >= 0.0) {
            return Err(invalid("brightness_factor must be a non-negative number".to_string()));
        }
        if !(0.0..=1.0).contains(&self.dither_strength) {
            return Err(invalid("dither_strength must be within 0.0..=1.0".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Built-in Profiles
// =============================================================================

/// Four-shade handheld look: grayscale, 8px blocks.
pub const GAMEBOY: StyleProfile = StyleProfile {
    name: "gameboy",
    canvas_size: 160,
    pixel_grid_size: 20,
    saturation_factor: 0.0,
    brightness_factor: 1.1,
    palette_size: 4,
    dither_strength: 0.0,
};

/// Home-computer look: punchy colors, 4px blocks.
pub const EIGHT_BIT: StyleProfile = StyleProfile {
    name: "8bit",
    canvas_size: 192,
    pixel_grid_size: 48,
    saturation_factor: 1.3,
    brightness_factor: 1.0,
    palette_size: 32,
    dither_strength: 0.0,
};

/// Console look with light dithering, 4px blocks.
pub const NES_RETRO: StyleProfile = StyleProfile {
    name: "nes-retro",
    canvas_size: 200,
    pixel_grid_size: 50,
    saturation_factor: 1.2,
    brightness_factor: 1.0,
    palette_size: 16,
    dither_strength: 0.5,
};

/// Very coarse grid with saturated colors, 16px blocks.
pub const EXTREME: StyleProfile = StyleProfile {
    name: "extreme",
    canvas_size: 256,
    pixel_grid_size: 16,
    saturation_factor: 1.5,
    brightness_factor: 1.05,
    palette_size: 8,
    dither_strength: 0.0,
};

// =============================================================================
// Style
// =============================================================================

/// The closed set of supported styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Style {
    #[serde(rename = "gameboy")]
    GameBoy,
    #[serde(rename = "8bit")]
    EightBit,
    #[serde(rename = "nes-retro")]
    NesRetro,
    #[serde(rename = "extreme")]
    Extreme,
}

impl Style {
    /// Every style, in registry order.
    pub const ALL: [Style; 4] = [Style::GameBoy, Style::EightBit, Style::NesRetro, Style::Extreme];

    /// The profile for this style.
    pub fn profile(&self) -> &'static StyleProfile {
        match self {
            Style::GameBoy => &GAMEBOY,
            Style::EightBit => &EIGHT_BIT,
            Style::NesRetro => &NES_RETRO,
            Style::Extreme => &EXTREME,
        }
    }

    pub fn name(&self) -> &'static str {
        self.profile().name
    }

    /// Comma-separated list of all style names.
    pub fn available() -> String {
        Style::ALL
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = StyleError;

    /// Parse a style name exactly; there is no default or fuzzy fallback.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .iter()
            .copied()
            .find(|style| style.name() == s)
            .ok_or_else(|| StyleError::UnknownStyle {
                name: s.to_string(),
                available: Style::available(),
            })
    }
}
