use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layers::{Legend, LegendEntry, Surface};
use crate::palette::TerrainPalette;
use crate::raster::Grid;

/// Band names, lowest first. Label ids follow this order.
pub const BAND_NAMES: [&str; 6] = ["water", "dark", "mid", "light", "transition", "edge"];

/// Ascending upper bounds of the first five bands; values at or above
/// `transition` fall into the edge band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainThresholds {
    pub water: f32,
    pub dark: f32,
    pub mid: f32,
    pub light: f32,
    pub transition: f32,
}

impl Default for TerrainThresholds {
    fn default() -> Self {
        Self {
            water: 0.25,
            dark: 0.4,
            mid: 0.58,
            light: 0.74,
            transition: 0.88,
        }
    }
}

impl TerrainThresholds {
    fn as_array(&self) -> [f32; 5] {
        [self.water, self.dark, self.mid, self.light, self.transition]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.as_array();
        if t.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::UnorderedThresholds("terrain".into()));
        }
        if t.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(ConfigError::invalid("terrain.thresholds", "must be within 0..=1"));
        }
        Ok(())
    }

    /// Band index of one normalized value.
    pub fn band(&self, v: f32) -> u16 {
        self.as_array()
            .iter()
            .position(|&t| v < t)
            .unwrap_or(BAND_NAMES.len() - 1) as u16
    }

    pub fn bucket(&self, normalized: &Grid<f32>) -> Grid<u16> {
        normalized.map(|&v| self.band(v))
    }
}

pub(super) fn band_legend(palette: &TerrainPalette, costs: &[u32; 6]) -> Legend {
    let colors = [
        palette.water,
        palette.dark,
        palette.mid,
        palette.light,
        palette.transition,
        palette.edge,
    ];
    let mut legend = Legend::new();
    for ((name, color), cost) in BAND_NAMES.iter().zip(colors).zip(costs) {
        legend.push(LegendEntry {
            name: name.to_string(),
            color,
            surface: if *name == "water" {
                Surface::Water
            } else {
                Surface::Ground
            },
            cost: *cost,
        });
    }
    legend
}
