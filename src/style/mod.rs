//! Retro style presets.
//!
//! Styles are a closed set defined at compile time. Each [`Style`] maps to an
//! immutable [`StyleProfile`] that parametrizes the transformation engine; the
//! [`StyleRegistry`] resolves request-supplied names to profiles.
//!
//! | style       | canvas | grid | palette | dither |
//! |-------------|--------|------|---------|--------|
//! | `gameboy`   | 160    | 20   | 4       | 0.0    |
//! | `8bit`      | 192    | 48   | 32      | 0.0    |
//! | `nes-retro` | 200    | 50   | 16      | 0.5    |
//! | `extreme`   | 256    | 16   | 8       | 0.0    |

mod profile;
mod registry;

pub use profile::{Style, StyleProfile, EIGHT_BIT, EXTREME, GAMEBOY, NES_RETRO};
pub use registry::StyleRegistry;
