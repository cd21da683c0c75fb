//! Vegetation density synthesis.
//!
//! Three strategies:
//! - [`VegetationMode::Banded`]: one field bucketed into an ordered density scale
//! - [`VegetationMode::Layered`]: feature layers, filterable by terrain membership
//! - [`VegetationMode::Mixed`]: banded, with the layered result swapped in per pixel
//!   with probability `wetness`
//!
//! Excluded terrain always ends up with no vegetation, whatever the mode.

mod banded;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use banded::BandedVegetation;

use crate::config::Cell;
use crate::error::ConfigError;
use crate::layers::{
    FeatureLayer, LayerPass, Legend, LegendEntry, Surface, TerrainRaster, VegetationRaster, lookup,
    paint_layers,
};
use crate::noise::{derive_seed, hash01};
use crate::palette::{Color, Palette};
use crate::raster::Grid;

/// Label id meaning "no vegetation".
pub const NONE: u16 = 0;
pub const NONE_NAME: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VegetationMode {
    Banded(BandedVegetation),
    Layered {
        layers: Vec<FeatureLayer>,
    },
    Mixed {
        #[serde(default)]
        banded: BandedVegetation,
        layers: Vec<FeatureLayer>,
        /// Probability (0..=1) that a pixel takes the layered result.
        wetness: f32,
    },
}

impl Default for VegetationMode {
    fn default() -> Self {
        Self::Banded(BandedVegetation::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VegetationConfig {
    pub mode: VegetationMode,
    /// Suppress vegetation on water and paved terrain.
    pub respect_terrain: bool,
    /// Terrain names that never carry vegetation.
    pub excluded_terrain: Vec<String>,
    /// Terrain name -> value added to the normalized noise before bucketing.
    pub terrain_bias: BTreeMap<String, f32>,
}

impl Default for VegetationConfig {
    fn default() -> Self {
        Self {
            mode: VegetationMode::default(),
            respect_terrain: true,
            excluded_terrain: Vec::new(),
            terrain_bias: BTreeMap::new(),
        }
    }
}

impl VegetationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            VegetationMode::Banded(banded) => banded.validate(),
            VegetationMode::Layered { layers } => validate_layers(layers),
            VegetationMode::Mixed {
                banded,
                layers,
                wetness,
            } => {
                if !(0.0..=1.0).contains(wetness) {
                    return Err(ConfigError::invalid("vegetation.wetness", "must be within 0..=1"));
                }
                banded.validate()?;
                validate_layers(layers)
            }
        }
    }
}

fn validate_layers(layers: &[FeatureLayer]) -> Result<(), ConfigError> {
    layers.iter().try_for_each(|l| l.validate("vegetation.layers"))
}

/// Produces the vegetation raster for one cell, reading the finished terrain.
pub struct VegetationSynthesizer<'a> {
    config: &'a VegetationConfig,
    palette: &'a Palette,
    master_seed: u64,
    workers: usize,
}

impl<'a> VegetationSynthesizer<'a> {
    pub fn new(config: &'a VegetationConfig, palette: &'a Palette, master_seed: u64) -> Self {
        Self {
            config,
            palette,
            master_seed,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn generate(&self, cell: &Cell, terrain: &TerrainRaster) -> Result<VegetationRaster, ConfigError> {
        if terrain.width() != cell.width || terrain.height() != cell.height {
            return Err(ConfigError::invalid(
                "vegetation",
                "terrain raster does not match the cell size",
            ));
        }

        let mut legend = Legend::new();
        legend.push(LegendEntry {
            name: NONE_NAME.to_string(),
            color: Color::TRANSPARENT,
            surface: Surface::Ground,
            cost: 0,
        });
        let bias = self.bias_table(terrain)?;
        let pass = LayerPass {
            cell,
            master_seed: self.master_seed,
            seed_scope: "vegetation",
            workers: self.workers,
            transform: None,
            terrain: Some(terrain),
        };

        let mut labels = match &self.config.mode {
            VegetationMode::Banded(banded) => {
                banded.paint(&pass, self.palette, &bias, &mut legend)?
            }
            VegetationMode::Layered { layers } => {
                let mut labels = Grid::filled(cell.width, cell.height, NONE);
                paint_layers(&pass, layers, &mut labels, &mut legend)?;
                labels
            }
            VegetationMode::Mixed {
                banded,
                layers,
                wetness,
            } => {
                let mut labels = banded.paint(&pass, self.palette, &bias, &mut legend)?;
                let mut wet = Grid::filled(cell.width, cell.height, NONE);
                paint_layers(&pass, layers, &mut wet, &mut legend)?;
                let seed = derive_seed(self.master_seed, "vegetation.mix") as u64;
                let mut swapped = 0usize;
                for (x, y, &w) in wet.enumerate() {
                    if w == NONE {
                        continue;
                    }
                    let (gx, gy) = cell.global(x, y);
                    if hash01(seed, gx as i64, gy as i64) < *wetness as f64 {
                        labels.set(x, y, w);
                        swapped += 1;
                    }
                }
                tracing::debug!(swapped, "mixed vegetation blend");
                labels
            }
        };

        let excluded = self.exclusion_table(terrain)?;
        let mut suppressed = 0usize;
        for (x, y, &t) in terrain.labels.enumerate() {
            if lookup(&excluded, t) && *labels.get(x, y) != NONE {
                labels.set(x, y, NONE);
                suppressed += 1;
            }
        }

        let raster = VegetationRaster::from_labels(labels, legend);
        info!(
            suppressed,
            covered = raster.labels.iter().filter(|&&l| l != NONE).count(),
            "vegetation generated"
        );
        Ok(raster)
    }

    /// Per terrain label: `true` if vegetation is suppressed there.
    fn exclusion_table(&self, terrain: &TerrainRaster) -> Result<Vec<bool>, ConfigError> {
        let named = terrain
            .legend
            .membership(&self.config.excluded_terrain, "terrain")?;
        let respect = self.config.respect_terrain;
        Ok(terrain
            .legend
            .entries()
            .iter()
            .zip(named)
            .map(|(e, by_name)| {
                by_name || (respect && matches!(e.surface, Surface::Water | Surface::Paved))
            })
            .collect())
    }

    /// Per terrain label: density bias added before bucketing.
    fn bias_table(&self, terrain: &TerrainRaster) -> Result<Vec<f32>, ConfigError> {
        if let Some(unknown) = self
            .config
            .terrain_bias
            .keys()
            .find(|k| !terrain.legend.contains_name(k))
        {
            return Err(ConfigError::UnknownName {
                kind: "terrain",
                name: unknown.clone(),
            });
        }
        Ok(terrain
            .legend
            .entries()
            .iter()
            .map(|e| self.config.terrain_bias.get(&e.name).copied().unwrap_or(0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Canvas;
    use crate::noise::NoiseSpec;
    use crate::terrain::{TerrainConfig, TerrainSynthesizer};

    fn terrain(cell: &Cell) -> TerrainRaster {
        TerrainSynthesizer::new(&TerrainConfig::default(), &Palette::default(), 12345)
            .generate(cell)
            .unwrap()
    }

    #[test]
    fn test_water_never_vegetated() {
        let cell = Canvas::single(96, 96).full();
        let terrain = terrain(&cell);
        let config = VegetationConfig {
            mode: VegetationMode::Banded(BandedVegetation {
                bands: vec![0.0, 0.2, 0.4, 0.6, 0.8],
                ..Default::default()
            }),
            ..Default::default()
        };
        let veg = VegetationSynthesizer::new(&config, &Palette::default(), 12345)
            .generate(&cell, &terrain)
            .unwrap();
        for (x, y, &t) in terrain.labels.enumerate() {
            if terrain.legend.get(t).map(|e| e.surface) == Some(Surface::Water) {
                assert_eq!(*veg.labels.get(x, y), NONE);
                assert_eq!(veg.image.get_pixel(x, y).0[3], 0);
            }
        }
    }

    #[test]
    fn test_excluded_name_suppresses() {
        let cell = Canvas::single(64, 64).full();
        let terrain = terrain(&cell);
        let config = VegetationConfig {
            mode: VegetationMode::Banded(BandedVegetation {
                bands: vec![0.0, 0.2, 0.4, 0.6, 0.8],
                ..Default::default()
            }),
            excluded_terrain: vec!["mid".into()],
            ..Default::default()
        };
        let veg = VegetationSynthesizer::new(&config, &Palette::default(), 1)
            .generate(&cell, &terrain)
            .unwrap();
        for (x, y, _) in terrain.labels.enumerate() {
            if terrain.name_at(x, y) == Some("mid") {
                assert_eq!(*veg.labels.get(x, y), NONE);
            }
        }
    }

    #[test]
    fn test_mixed_wetness_extremes() {
        let cell = Canvas::single(64, 64).full();
        let terrain = terrain(&cell);
        let layer = FeatureLayer::flat("reeds", Color::rgb(10, 200, 10), 0.2, NoiseSpec::new(15.0));
        let mixed = |wetness| VegetationConfig {
            mode: VegetationMode::Mixed {
                banded: BandedVegetation::default(),
                layers: vec![layer.clone()],
                wetness,
            },
            respect_terrain: false,
            ..Default::default()
        };
        let palette = Palette::default();
        let dry = VegetationSynthesizer::new(&mixed(0.0), &palette, 5)
            .generate(&cell, &terrain)
            .unwrap();
        let wet = VegetationSynthesizer::new(&mixed(1.0), &palette, 5)
            .generate(&cell, &terrain)
            .unwrap();
        assert_eq!(dry.count_named("reeds"), 0);
        assert!(wet.count_named("reeds") > 0);

        let banded_only = VegetationConfig {
            mode: VegetationMode::Banded(BandedVegetation::default()),
            respect_terrain: false,
            ..Default::default()
        };
        let banded = VegetationSynthesizer::new(&banded_only, &palette, 5)
            .generate(&cell, &terrain)
            .unwrap();
        assert_eq!(dry.labels, banded.labels);
    }

    #[test]
    fn test_mixed_is_deterministic() {
        let cell = Canvas::single(48, 48).full();
        let terrain = terrain(&cell);
        let config = VegetationConfig {
            mode: VegetationMode::Mixed {
                banded: BandedVegetation::default(),
                layers: vec![FeatureLayer::flat(
                    "moss",
                    Color::rgb(1, 90, 1),
                    0.3,
                    NoiseSpec::new(12.0),
                )],
                wetness: 0.5,
            },
            ..Default::default()
        };
        let palette = Palette::default();
        let a = VegetationSynthesizer::new(&config, &palette, 8).generate(&cell, &terrain).unwrap();
        let b = VegetationSynthesizer::new(&config, &palette, 8)
            .with_workers(4)
            .generate(&cell, &terrain)
            .unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn test_terrain_bias_shifts_density() {
        let cell = Canvas::single(128, 128).full();
        let terrain = terrain(&cell);
        let palette = Palette::default();
        let thick = |bias: f32| {
            let mut config = VegetationConfig {
                respect_terrain: false,
                ..Default::default()
            };
            for entry in terrain.legend.entries() {
                config.terrain_bias.insert(entry.name.clone(), bias);
            }
            let veg = VegetationSynthesizer::new(&config, &palette, 3)
                .generate(&cell, &terrain)
                .unwrap();
            veg.count_named("dense") + veg.count_named("very_dense")
        };
        let base = thick(0.0);
        assert!(thick(0.3) > base);
        assert!(thick(-0.3) < base);
    }

    #[test]
    fn test_unknown_bias_name_rejected() {
        let cell = Canvas::single(16, 16).full();
        let terrain = terrain(&cell);
        let mut config = VegetationConfig::default();
        config.terrain_bias.insert("lava".into(), 0.2);
        let res = VegetationSynthesizer::new(&config, &Palette::default(), 1).generate(&cell, &terrain);
        assert!(matches!(res, Err(ConfigError::UnknownName { .. })));
    }
}
