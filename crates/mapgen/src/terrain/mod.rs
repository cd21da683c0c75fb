//! Terrain synthesis.
//!
//! Paints the biome raster from noise, either by bucketing one global field into
//! ordered bands ([`TerrainMode::Threshold`]) or by painting an ordered list of
//! [`FeatureLayer`]s ([`TerrainMode::Layered`]). A post-process pipeline then
//! roughens the boundaries.

mod post;
mod threshold;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use post::{PostPass, TerrainPostConfig};
pub use threshold::{BAND_NAMES, TerrainThresholds};

use crate::config::Cell;
use crate::error::ConfigError;
use crate::layers::{FeatureLayer, LayerPass, Legend, LegendEntry, Surface, TerrainRaster, paint_layers};
use crate::noise::{NoiseSampler, NoiseSpec, SampleTransform, compute_field};
use crate::palette::Palette;
use crate::raster::Grid;

/// Name of the background label in layered mode.
pub const BASE_NAME: &str = "base";

/// How a raw noise field is mapped to [0, 1] before bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Rescale over the generated region's own min/max.
    #[default]
    MinMax,
    /// Fixed `(v + 1) / 2`; identical across independently generated cells.
    Fixed,
}

impl Normalization {
    pub fn apply(&self, field: &Grid<f32>) -> Grid<f32> {
        match self {
            Self::MinMax => crate::noise::normalize_min_max(field),
            Self::Fixed => field.map(|&v| crate::noise::to_unit(v)),
        }
    }
}

/// Terrain painting strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TerrainMode {
    /// One global field bucketed into water < dark < mid < light < transition < edge.
    Threshold {
        #[serde(default)]
        noise: NoiseSpec,
        #[serde(default)]
        thresholds: TerrainThresholds,
        #[serde(default)]
        normalization: Normalization,
    },
    /// Ordered feature layers over a base fill; later layers win.
    Layered { layers: Vec<FeatureLayer> },
}

impl Default for TerrainMode {
    fn default() -> Self {
        Self::Threshold {
            noise: NoiseSpec::new(120.0).with_octaves(5),
            thresholds: TerrainThresholds::default(),
            normalization: Normalization::default(),
        }
    }
}

/// Road traversal cost of each threshold band and the layered base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainCosts {
    pub water: u32,
    pub dark: u32,
    pub mid: u32,
    pub light: u32,
    pub transition: u32,
    pub edge: u32,
    pub base: u32,
}

impl Default for TerrainCosts {
    fn default() -> Self {
        Self {
            water: 50,
            dark: 4,
            mid: 2,
            light: 1,
            transition: 1,
            edge: 3,
            base: 1,
        }
    }
}

impl TerrainCosts {
    fn bands(&self) -> [u32; 6] {
        [
            self.water,
            self.dark,
            self.mid,
            self.light,
            self.transition,
            self.edge,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub mode: TerrainMode,
    /// Rotation and offset applied to sampled coordinates.
    pub transform: Option<SampleTransform>,
    pub costs: TerrainCosts,
    pub post: TerrainPostConfig,
}

impl TerrainConfig {
    pub fn threshold(noise: NoiseSpec, thresholds: TerrainThresholds) -> Self {
        Self {
            mode: TerrainMode::Threshold {
                noise,
                thresholds,
                normalization: Normalization::default(),
            },
            ..Default::default()
        }
    }

    pub fn layered(layers: Vec<FeatureLayer>) -> Self {
        Self {
            mode: TerrainMode::Layered { layers },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            TerrainMode::Threshold {
                noise, thresholds, ..
            } => {
                noise.validate("terrain.noise")?;
                thresholds.validate()?;
            }
            TerrainMode::Layered { layers } => {
                for layer in layers {
                    layer.validate("terrain.layers")?;
                }
            }
        }
        self.post.validate()
    }
}

/// Produces the terrain raster for one cell.
pub struct TerrainSynthesizer<'a> {
    config: &'a TerrainConfig,
    palette: &'a Palette,
    master_seed: u64,
    workers: usize,
}

impl<'a> TerrainSynthesizer<'a> {
    pub fn new(config: &'a TerrainConfig, palette: &'a Palette, master_seed: u64) -> Self {
        Self {
            config,
            palette,
            master_seed,
            workers: 1,
        }
    }

    /// Sets the worker count for noise evaluation.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn generate(&self, cell: &Cell) -> Result<TerrainRaster, ConfigError> {
        let (labels, legend) = match &self.config.mode {
            TerrainMode::Threshold {
                noise,
                thresholds,
                normalization,
            } => {
                let seed = noise.resolve_seed(self.master_seed, "terrain");
                let sampler = NoiseSampler::new(noise, seed);
                let field = compute_field(
                    cell,
                    &sampler,
                    self.config.transform.as_ref(),
                    self.workers,
                );
                let legend = threshold::band_legend(&self.palette.terrain, &self.config.costs.bands());
                let labels = thresholds.bucket(&normalization.apply(&field));
                (labels, legend)
            }
            TerrainMode::Layered { layers } => {
                let mut legend = Legend::new();
                legend.push(LegendEntry {
                    name: BASE_NAME.to_string(),
                    color: self.palette.terrain.mid,
                    surface: Surface::Ground,
                    cost: self.config.costs.base,
                });
                let mut labels = Grid::new(cell.width, cell.height);
                let pass = LayerPass {
                    cell,
                    master_seed: self.master_seed,
                    seed_scope: "terrain",
                    workers: self.workers,
                    transform: self.config.transform.as_ref(),
                    terrain: None,
                };
                paint_layers(&pass, layers, &mut labels, &mut legend)?;
                (labels, legend)
            }
        };

        let labels = self.config.post.run(labels, cell, self.master_seed);
        let raster = TerrainRaster::from_labels(labels, legend);
        info!(
            width = cell.width,
            height = cell.height,
            labels = raster.legend.len(),
            "terrain generated"
        );
        Ok(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Canvas;
    use crate::palette::Color;

    #[test]
    fn test_threshold_mode_deterministic() {
        let config = TerrainConfig::default();
        let palette = Palette::default();
        let cell = Canvas::single(64, 48).full();
        let a = TerrainSynthesizer::new(&config, &palette, 12345).generate(&cell).unwrap();
        let b = TerrainSynthesizer::new(&config, &palette, 12345)
            .with_workers(3)
            .generate(&cell)
            .unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn test_threshold_mode_has_water() {
        let config = TerrainConfig::default();
        let palette = Palette::default();
        let cell = Canvas::single(128, 128).full();
        let raster = TerrainSynthesizer::new(&config, &palette, 7).generate(&cell).unwrap();
        assert!(raster.count_named("water") > 0);
        assert_eq!(raster.legend.len(), BAND_NAMES.len());
    }

    #[test]
    fn test_layered_mode_precedence() {
        let palette = Palette::default();
        let red = Color::rgb(200, 0, 0);
        let blue = Color::rgb(0, 0, 200);
        let config = TerrainConfig::layered(vec![
            FeatureLayer::flat("red", red, 0.3, NoiseSpec::new(20.0)),
            FeatureLayer::flat("blue", blue, 0.3, NoiseSpec::new(25.0)),
        ]);
        let cell = Canvas::single(80, 80).full();
        let synth = TerrainSynthesizer::new(&config, &palette, 99);
        let raster = synth.generate(&cell).unwrap();

        // Recompute each layer's mask independently and check the overlap.
        let blue_field = crate::noise::normalize_min_max(&compute_field(
            &cell,
            &NoiseSampler::new(&NoiseSpec::new(25.0), crate::noise::derive_seed(99, "terrain.blue")),
            None,
            1,
        ));
        for (x, y, &v) in blue_field.enumerate() {
            if v > 0.3 {
                assert_eq!(raster.image.get_pixel(x, y).0, blue.0);
            }
        }
    }

    #[test]
    fn test_unknown_filter_name_is_config_error() {
        let palette = Palette::default();
        let config = TerrainConfig::layered(vec![
            FeatureLayer::flat("hill", Color::rgb(1, 2, 3), 0.5, NoiseSpec::new(9.0))
                .with_terrain_in(&["volcano"]),
        ]);
        let cell = Canvas::single(10, 10).full();
        let err = TerrainSynthesizer::new(&config, &palette, 1).generate(&cell);
        assert!(matches!(err, Err(ConfigError::UnknownName { .. })));
    }
}
