//! End-to-end generation: terrain → vegetation → roads → road post → detail.

use std::time::Instant;

use image::RgbaImage;
use tracing::info;

use crate::config::{Cell, MapConfig};
use crate::detail::{DetailGenerator, RuleColors};
use crate::error::Result;
use crate::layers::{TerrainRaster, VegetationRaster};
use crate::palette::Palette;
use crate::parallel::default_workers;
use crate::raster::opaque_mask;
use crate::roads::post::RoadPostProcessor;
use crate::roads::{RoadLayer, RoadNetwork, RoadPlanner, rasterize};
use crate::terrain::TerrainSynthesizer;
use crate::vegetation::VegetationSynthesizer;

/// Stage timings and counts of one run.
#[derive(Debug, Clone, Default)]
pub struct GenerationMetrics {
    pub terrain_ms: u64,
    pub vegetation_ms: u64,
    pub roads_ms: u64,
    pub detail_ms: u64,
    pub road_polylines: usize,
    pub road_segments: usize,
    pub parking_lots: usize,
    pub detail_pixels: usize,
}

/// The four aligned layers of one generated region.
#[derive(Debug, Clone)]
pub struct GeneratedMap {
    pub terrain: TerrainRaster,
    pub vegetation: VegetationRaster,
    /// `None` when roads are disabled.
    pub roads: Option<RoadLayer>,
    pub network: Option<RoadNetwork>,
    pub detail: RgbaImage,
    pub metrics: GenerationMetrics,
}

impl GeneratedMap {
    pub fn width(&self) -> u32 {
        self.terrain.width()
    }

    pub fn height(&self) -> u32 {
        self.terrain.height()
    }

    /// Roads with potholes applied; fully transparent when roads are disabled.
    pub fn roads_image(&self) -> RgbaImage {
        match &self.roads {
            Some(layer) => layer.flattened(),
            None => RgbaImage::new(self.width(), self.height()),
        }
    }

    /// Alpha-blends terrain, vegetation, roads and detail, bottom to top.
    pub fn composite(&self) -> RgbaImage {
        let mut out = self.terrain.image.clone();
        image::imageops::overlay(&mut out, &self.vegetation.image, 0, 0);
        if let Some(layer) = &self.roads {
            image::imageops::overlay(&mut out, &layer.image, 0, 0);
            image::imageops::overlay(&mut out, &layer.potholes, 0, 0);
        }
        image::imageops::overlay(&mut out, &self.detail, 0, 0);
        out
    }
}

/// Runs every stage for a canvas or one of its cells.
///
/// # Example
///
/// ```rust,ignore
/// let map = MapGenerator::new(MapConfig::default().with_seed(12345))
///     .with_rule_colors(colors)
///     .with_workers(4)
///     .generate()?;
/// let png = map.composite();
/// ```
pub struct MapGenerator {
    config: MapConfig,
    palette: Palette,
    rule_colors: RuleColors,
    workers: Option<usize>,
}

impl MapGenerator {
    pub fn new(config: MapConfig) -> Self {
        Self {
            config,
            palette: Palette::default(),
            rule_colors: RuleColors::new(),
            workers: None,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_rule_colors(mut self, rule_colors: RuleColors) -> Self {
        self.rule_colors = rule_colors;
        self
    }

    /// Overrides `MapConfig::workers`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Generates the whole canvas as one region.
    pub fn generate(&self) -> Result<GeneratedMap> {
        self.config.validate()?;
        self.run(&self.config.canvas.full())
    }

    /// Generates one cell of the canvas.
    ///
    /// Noise is sampled in canvas coordinates, but the default
    /// [`Normalization::MinMax`] rescales each cell over its own range, so
    /// labels of neighbouring cells do not meet at the seams. Set
    /// `Normalization::Fixed` on the terrain, banded vegetation and grid-scan
    /// detail stages for cells that tile. Feature layers and roads are
    /// always computed per cell.
    ///
    /// [`Normalization::MinMax`]: crate::terrain::Normalization::MinMax
    pub fn generate_cell(&self, col: u32, row: u32) -> Result<GeneratedMap> {
        self.config.validate()?;
        let cell = self.config.canvas.cell(col, row)?;
        self.run(&cell)
    }

    fn workers(&self) -> usize {
        self.workers
            .or(self.config.workers)
            .unwrap_or_else(default_workers)
    }

    fn run(&self, cell: &Cell) -> Result<GeneratedMap> {
        let config = &self.config;
        let seed = config.seed;
        let workers = self.workers();
        let mut metrics = GenerationMetrics::default();
        info!(
            width = cell.width,
            height = cell.height,
            offset_x = cell.offset_x,
            offset_y = cell.offset_y,
            seed,
            workers,
            "generating map"
        );

        let start = Instant::now();
        let terrain = TerrainSynthesizer::new(&config.terrain, &self.palette, seed)
            .with_workers(workers)
            .generate(cell)?;
        metrics.terrain_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let mut vegetation = VegetationSynthesizer::new(&config.vegetation, &self.palette, seed)
            .with_workers(workers)
            .generate(cell, &terrain)?;
        metrics.vegetation_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let (roads, network) = if config.roads.enabled {
            let network = RoadPlanner::new(&config.roads, seed).plan(Some(&terrain), Some(&vegetation))?;
            let mut layer = rasterize(&network, &config.roads.classes, self.palette.parking_lot);
            RoadPostProcessor::new(&config.road_post, seed).run(&mut layer, Some(&mut vegetation));
            metrics.road_polylines = network.polylines.len();
            metrics.road_segments = network.segments.len();
            metrics.parking_lots = network.lots.len();
            (Some(layer), Some(network))
        } else {
            info!("roads disabled");
            (None, None)
        };
        metrics.roads_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let detail = DetailGenerator::new(&config.detail, &self.palette, &self.rule_colors, seed)
            .with_workers(workers)
            .generate(cell, Some(&terrain), Some(&vegetation), roads.as_ref())?;
        metrics.detail_ms = start.elapsed().as_millis() as u64;
        metrics.detail_pixels = opaque_mask(&detail).count();

        info!(
            terrain_ms = metrics.terrain_ms,
            vegetation_ms = metrics.vegetation_ms,
            roads_ms = metrics.roads_ms,
            detail_ms = metrics.detail_ms,
            "map generated"
        );

        Ok(GeneratedMap {
            terrain,
            vegetation,
            roads,
            network,
            detail,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Canvas;
    use crate::noise::NoiseSpec;
    use crate::terrain::{Normalization, TerrainMode};

    fn small(seed: u64) -> MapConfig {
        MapConfig::default()
            .with_canvas(Canvas::single(96, 96))
            .with_seed(seed)
    }

    #[test]
    fn test_layers_share_dimensions() {
        let map = MapGenerator::new(small(4)).with_workers(2).generate().unwrap();
        assert_eq!(map.vegetation.image.dimensions(), (96, 96));
        assert_eq!(map.roads_image().dimensions(), (96, 96));
        assert_eq!(map.detail.dimensions(), (96, 96));
        assert_eq!(map.composite().dimensions(), (96, 96));
    }

    #[test]
    fn test_roads_can_be_disabled() {
        let mut config = small(4);
        config.roads.enabled = false;
        let map = MapGenerator::new(config).generate().unwrap();
        assert!(map.roads.is_none());
        assert!(map.roads_image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let mut config = small(1);
        config.detail.global_density = -1.0;
        assert!(MapGenerator::new(config).generate().is_err());
    }

    #[test]
    fn test_fixed_normalization_cells_meet_whole_canvas() {
        let mut config = MapConfig::default()
            .with_canvas(Canvas::grid(48, 48, 2, 2))
            .with_seed(21);
        config.terrain.mode = TerrainMode::Threshold {
            noise: NoiseSpec::new(40.0).with_octaves(3),
            thresholds: Default::default(),
            normalization: Normalization::Fixed,
        };
        config.roads.enabled = false;
        let generator = MapGenerator::new(config).with_workers(1);
        let whole = generator.generate().unwrap();
        let cell = generator.generate_cell(1, 0).unwrap();
        assert_eq!(cell.width(), 48);
        for (x, y, label) in cell.terrain.labels.enumerate() {
            assert_eq!(*label, *whole.terrain.labels.get(x + 48, y));
        }
    }

    #[test]
    fn test_composite_is_opaque_over_terrain() {
        let map = MapGenerator::new(small(8)).generate().unwrap();
        assert!(map.composite().pixels().all(|p| p.0[3] == 255));
    }
}
