//! Colors and the per-run palette snapshot.
//!
//! Every synthesizer receives the palette explicitly; there is no process-wide
//! color table.

use image::Rgba;
use serde::{Deserialize, Serialize};

/// An RGBA color. Alpha 0 means "nothing painted here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Perceived brightness in [0, 1].
    pub fn luminance(&self) -> f32 {
        let [r, g, b, _] = self.0;
        (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
    }

    /// Scales the RGB channels by `factor`, keeping alpha.
    pub fn shade(&self, factor: f32) -> Self {
        let [r, g, b, a] = self.0;
        let s = |c: u8| (c as f32 * factor).round().clamp(0.0, 255.0) as u8;
        Self([s(r), s(g), s(b), a])
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba(self.0)
    }
}

impl From<Rgba<u8>> for Color {
    fn from(p: Rgba<u8>) -> Self {
        Self(p.0)
    }
}

impl From<Color> for Rgba<u8> {
    fn from(c: Color) -> Self {
        Rgba(c.0)
    }
}

/// A named color, used for ordered scales such as vegetation density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedColor {
    pub name: String,
    pub color: Color,
}

impl NamedColor {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
        }
    }
}

/// Colors of the terrain bands used by threshold mode, lowest band first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainPalette {
    pub water: Color,
    pub dark: Color,
    pub mid: Color,
    pub light: Color,
    pub transition: Color,
    pub edge: Color,
}

impl Default for TerrainPalette {
    fn default() -> Self {
        Self {
            water: Color::rgb(58, 96, 140),
            dark: Color::rgb(62, 84, 46),
            mid: Color::rgb(86, 112, 60),
            light: Color::rgb(118, 138, 78),
            transition: Color::rgb(150, 142, 96),
            edge: Color::rgb(172, 160, 120),
        }
    }
}

/// Immutable palette snapshot for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Palette {
    pub terrain: TerrainPalette,
    /// Vegetation density scale, sparsest first. "None" is implicit.
    pub vegetation: Vec<NamedColor>,
    pub parking_lot: Color,
    /// Paint color for detail rules that resolve to no color.
    pub detail_fallback: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            terrain: TerrainPalette::default(),
            vegetation: vec![
                NamedColor::new("sparse", Color::rgba(96, 140, 64, 140)),
                NamedColor::new("light", Color::rgba(78, 124, 52, 170)),
                NamedColor::new("medium", Color::rgba(60, 106, 42, 200)),
                NamedColor::new("dense", Color::rgba(42, 86, 32, 225)),
                NamedColor::new("very_dense", Color::rgba(28, 64, 24, 250)),
            ],
            parking_lot: Color::rgb(92, 92, 96),
            detail_fallback: Color::rgb(255, 0, 255),
        }
    }
}
