//! Configuration types for map generation.

use serde::{Deserialize, Serialize};

use crate::detail::DetailConfig;
use crate::error::ConfigError;
use crate::roads::RoadConfig;
use crate::roads::post::RoadPostConfig;
use crate::terrain::TerrainConfig;
use crate::vegetation::VegetationConfig;

/// Map canvas made of equally sized cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    /// Width of one cell in pixels.
    pub cell_width: u32,
    /// Height of one cell in pixels.
    pub cell_height: u32,
    /// Number of cell columns.
    pub cols: u32,
    /// Number of cell rows.
    pub rows: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::single(512, 512)
    }
}

impl Canvas {
    /// A canvas consisting of one cell.
    pub const fn single(width: u32, height: u32) -> Self {
        Self {
            cell_width: width,
            cell_height: height,
            cols: 1,
            rows: 1,
        }
    }

    pub const fn grid(cell_width: u32, cell_height: u32, cols: u32, rows: u32) -> Self {
        Self {
            cell_width,
            cell_height,
            cols,
            rows,
        }
    }

    pub fn width(&self) -> u32 {
        self.cell_width * self.cols
    }

    pub fn height(&self) -> u32 {
        self.cell_height * self.rows
    }

    /// The whole canvas as a single region.
    pub fn full(&self) -> Cell {
        Cell {
            width: self.width(),
            height: self.height(),
            offset_x: 0,
            offset_y: 0,
            canvas_width: self.width(),
            canvas_height: self.height(),
        }
    }

    /// One cell of the canvas; its noise coordinates are shifted by its position.
    pub fn cell(&self, col: u32, row: u32) -> Result<Cell, ConfigError> {
        if col >= self.cols || row >= self.rows {
            return Err(ConfigError::CellOutOfRange {
                col,
                row,
                cols: self.cols,
                rows: self.rows,
            });
        }
        Ok(Cell {
            width: self.cell_width,
            height: self.cell_height,
            offset_x: col * self.cell_width,
            offset_y: row * self.cell_height,
            canvas_width: self.width(),
            canvas_height: self.height(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_width == 0 || self.cell_height == 0 {
            return Err(ConfigError::invalid("canvas", "cell size must be non-zero"));
        }
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::invalid("canvas", "needs at least one cell"));
        }
        Ok(())
    }
}

/// A rectangular region of a canvas that gets rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub width: u32,
    pub height: u32,
    /// Global x of the region's left column.
    pub offset_x: u32,
    /// Global y of the region's top row.
    pub offset_y: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Cell {
    /// Global coordinate of a local pixel.
    #[inline]
    pub fn global(&self, x: u32, y: u32) -> (f64, f64) {
        ((self.offset_x + x) as f64, (self.offset_y + y) as f64)
    }

    /// Centre of the whole canvas in global coordinates.
    pub fn canvas_center(&self) -> (f64, f64) {
        (
            self.canvas_width as f64 / 2.0,
            self.canvas_height as f64 / 2.0,
        )
    }
}

/// Complete configuration of one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub canvas: Canvas,
    /// Master seed; every per-layer seed not given explicitly derives from it.
    pub seed: u64,
    /// Worker count for noise evaluation. `None` uses every available core.
    pub workers: Option<usize>,
    pub terrain: TerrainConfig,
    pub vegetation: VegetationConfig,
    pub roads: RoadConfig,
    pub road_post: RoadPostConfig,
    pub detail: DetailConfig,
}

impl MapConfig {
    pub fn with_canvas(mut self, canvas: Canvas) -> Self {
        self.canvas = canvas;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Checks every component; called once at the engine boundary.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.canvas.validate()?;
        if self.workers == Some(0) {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        self.terrain.validate()?;
        self.vegetation.validate()?;
        self.roads.validate()?;
        self.road_post.validate()?;
        self.detail.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_offsets() {
        let canvas = Canvas::grid(100, 80, 3, 2);
        assert_eq!(canvas.width(), 300);
        assert_eq!(canvas.height(), 160);
        let cell = canvas.cell(2, 1).unwrap();
        assert_eq!((cell.offset_x, cell.offset_y), (200, 80));
        assert_eq!(cell.global(5, 6), (205.0, 86.0));
        assert_eq!(cell.canvas_center(), (150.0, 80.0));
    }

    #[test]
    fn test_cell_out_of_range() {
        let canvas = Canvas::grid(10, 10, 2, 2);
        assert!(matches!(
            canvas.cell(2, 0),
            Err(ConfigError::CellOutOfRange { .. })
        ));
    }

    #[test]
    fn test_default_config_validates() {
        MapConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = MapConfig::default().with_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip_defaults() {
        let config: MapConfig = serde_json::from_str(r#"{ "seed": 7 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.canvas, Canvas::default());
    }
}
