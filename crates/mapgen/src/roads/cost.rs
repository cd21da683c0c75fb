use glam::Vec2;

use crate::error::GenError;
use crate::layers::{Surface, TerrainRaster, VegetationRaster};
use crate::raster::{Grid, line_points};

/// Per-pixel traversal cost: terrain cost plus vegetation cost, `None` where impassable.
#[derive(Debug, Clone)]
pub struct CostMap {
    costs: Grid<Option<u32>>,
}

impl CostMap {
    pub fn build(
        terrain: Option<&TerrainRaster>,
        vegetation: Option<&VegetationRaster>,
        ignore_water: bool,
    ) -> Result<Self, GenError> {
        let terrain = terrain.ok_or(GenError::MissingPrerequisite("terrain raster"))?;
        let vegetation = vegetation.filter(|v| {
            let matches = v.width() == terrain.width() && v.height() == terrain.height();
            if !matches {
                tracing::warn!("vegetation raster size differs from terrain; ignoring its cost");
            }
            matches
        });

        let costs = Grid::from_fn(terrain.width(), terrain.height(), |x, y| {
            let entry = terrain.entry_at(x, y)?;
            if entry.surface == Surface::Water && !ignore_water {
                return None;
            }
            let veg = vegetation
                .and_then(|v| v.entry_at(x, y))
                .map(|e| e.cost)
                .unwrap_or(0);
            Some(entry.cost.max(1) + veg)
        });
        Ok(Self { costs })
    }

    pub fn from_grid(costs: Grid<Option<u32>>) -> Self {
        Self { costs }
    }

    pub fn width(&self) -> u32 {
        self.costs.width()
    }

    pub fn height(&self) -> u32 {
        self.costs.height()
    }

    /// `None` when out of bounds or impassable.
    pub fn at(&self, x: i32, y: i32) -> Option<u32> {
        self.costs.get_signed(x, y).copied().flatten()
    }

    /// Mean cost of the pixels under the line `a-b`; `None` if any pixel is
    /// impassable or outside the canvas.
    pub fn mean_along(&self, a: Vec2, b: Vec2) -> Option<f32> {
        let pts = line_points(to_pixel(a), to_pixel(b));
        let mut total = 0u64;
        for &(x, y) in &pts {
            total += self.at(x, y)? as u64;
        }
        Some(total as f32 / pts.len() as f32)
    }
}

pub(crate) fn to_pixel(p: Vec2) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

/// Coarse cost grid for pathfinding. A cell is impassable when more than half of
/// its pixels are; otherwise it costs the mean of its passable pixels.
#[derive(Debug, Clone)]
pub struct CostGrid {
    resolution: u32,
    cells: Grid<Option<u32>>,
}

impl CostGrid {
    pub fn from_map(map: &CostMap, resolution: u32) -> Self {
        let resolution = resolution.max(1);
        let cols = map.width().div_ceil(resolution);
        let rows = map.height().div_ceil(resolution);
        let cells = Grid::from_fn(cols, rows, |cx, cy| {
            let (x0, y0) = (cx * resolution, cy * resolution);
            let x1 = (x0 + resolution).min(map.width());
            let y1 = (y0 + resolution).min(map.height());
            let mut sum = 0u64;
            let mut passable = 0u64;
            let mut total = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    total += 1;
                    if let Some(c) = map.at(x as i32, y as i32) {
                        sum += c as u64;
                        passable += 1;
                    }
                }
            }
            if passable * 2 < total || passable == 0 {
                None
            } else {
                Some(((sum as f64 / passable as f64).round() as u32).max(1))
            }
        });
        Self { resolution, cells }
    }

    pub fn cols(&self) -> i32 {
        self.cells.width() as i32
    }

    pub fn rows(&self) -> i32 {
        self.cells.height() as i32
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn cost(&self, c: (i32, i32)) -> Option<u32> {
        self.cells.get_signed(c.0, c.1).copied().flatten()
    }

    pub fn min_cost(&self) -> u32 {
        self.cells.iter().flatten().copied().min().unwrap_or(1)
    }

    /// Raises the cost of every passable cell within `radius` of the path.
    pub fn inflate(&mut self, path: &[(i32, i32)], radius: u32, amount: u32) {
        if amount == 0 {
            return;
        }
        let r = radius as i32;
        let mut touched = crate::raster::Mask::new(self.cells.width(), self.cells.height());
        for &(px, py) in path {
            for (x, y) in crate::raster::disk_points(px, py, r) {
                if self.cells.in_bounds(x, y) {
                    touched.set(x as u32, y as u32, true);
                }
            }
        }
        for (x, y) in touched.iter_true() {
            if let Some(c) = self.cells.get_mut(x, y) {
                *c = c.saturating_add(amount);
            }
        }
    }

    /// Pixel centre of a cell, clamped to the canvas.
    pub fn center(&self, c: (i32, i32), width: u32, height: u32) -> Vec2 {
        let half = self.resolution as f32 / 2.0;
        let x = (c.0 as f32 * self.resolution as f32 + half).min(width.saturating_sub(1) as f32);
        let y = (c.1 as f32 * self.resolution as f32 + half).min(height.saturating_sub(1) as f32);
        Vec2::new(x, y)
    }

    pub fn cell_of(&self, p: Vec2) -> (i32, i32) {
        let r = self.resolution as f32;
        ((p.x / r).floor() as i32, (p.y / r).floor() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LabeledRaster, Legend, LegendEntry};
    use crate::palette::Color;

    fn terrain(w: u32, h: u32, water_cols: u32) -> TerrainRaster {
        let mut legend = Legend::new();
        legend.push(LegendEntry {
            name: "land".into(),
            color: Color::rgb(0, 200, 0),
            surface: Surface::Ground,
            cost: 2,
        });
        legend.push(LegendEntry {
            name: "water".into(),
            color: Color::rgb(0, 0, 200),
            surface: Surface::Water,
            cost: 50,
        });
        LabeledRaster::from_labels(Grid::from_fn(w, h, |x, _| u16::from(x < water_cols)), legend)
    }

    #[test]
    fn test_missing_terrain_is_fatal() {
        assert!(matches!(
            CostMap::build(None, None, false),
            Err(GenError::MissingPrerequisite(_))
        ));
    }

    #[test]
    fn test_water_impassable_unless_ignored() {
        let t = terrain(8, 8, 2);
        let blocked = CostMap::build(Some(&t), None, false).unwrap();
        assert_eq!(blocked.at(0, 0), None);
        assert_eq!(blocked.at(5, 5), Some(2));
        assert_eq!(blocked.at(9, 0), None);
        let open = CostMap::build(Some(&t), None, true).unwrap();
        assert_eq!(open.at(0, 0), Some(50));
    }

    #[test]
    fn test_vegetation_adds_cost() {
        let t = terrain(4, 4, 0);
        let mut legend = Legend::new();
        legend.push(LegendEntry {
            name: "none".into(),
            color: Color::TRANSPARENT,
            surface: Surface::Ground,
            cost: 0,
        });
        legend.push(LegendEntry {
            name: "dense".into(),
            color: Color::rgb(0, 90, 0),
            surface: Surface::Ground,
            cost: 4,
        });
        let veg = LabeledRaster::from_labels(Grid::from_fn(4, 4, |x, _| u16::from(x == 3)), legend);
        let map = CostMap::build(Some(&t), Some(&veg), false).unwrap();
        assert_eq!(map.at(0, 0), Some(2));
        assert_eq!(map.at(3, 0), Some(6));
    }

    #[test]
    fn test_mean_along_rejects_water() {
        let t = terrain(10, 10, 3);
        let map = CostMap::build(Some(&t), None, false).unwrap();
        assert_eq!(map.mean_along(Vec2::new(5.0, 5.0), Vec2::new(9.0, 5.0)), Some(2.0));
        assert_eq!(map.mean_along(Vec2::new(5.0, 5.0), Vec2::new(1.0, 5.0)), None);
    }

    #[test]
    fn test_grid_aggregation_and_inflation() {
        let t = terrain(16, 8, 4);
        let map = CostMap::build(Some(&t), None, false).unwrap();
        let mut grid = CostGrid::from_map(&map, 4);
        assert_eq!((grid.cols(), grid.rows()), (4, 2));
        assert_eq!(grid.cost((0, 0)), None);
        assert_eq!(grid.cost((2, 1)), Some(2));
        grid.inflate(&[(2, 0)], 0, 10);
        assert_eq!(grid.cost((2, 0)), Some(12));
        assert_eq!(grid.cost((3, 0)), Some(2));
    }
}
