//! Grid pathfinding planner: highways across the canvas, a town grid, majors
//! into town, and side spurs to the nearest road.

use glam::Vec2;
use pathfinding::prelude::{astar, dijkstra};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cost::{CostGrid, CostMap};
use super::{RoadClass, RoadClasses, RoadNetwork};
use crate::error::ConfigError;
use crate::raster::{Mask, NEIGHBORS_4, NEIGHBORS_8};

type Node = (i32, i32);

const STRAIGHT: u32 = 10;
const DIAGONAL: u32 = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindConfig {
    /// Pixels per grid cell.
    pub resolution: u32,
    /// Cells around a placed path whose cost is raised.
    pub inflate_radius: u32,
    pub inflate_cost: u32,
    /// Town side length in cells.
    pub town_size: u32,
    /// Cells between parallel town streets.
    pub town_spacing: u32,
    /// Interior cells sampled when choosing the town centre.
    pub town_samples: usize,
    /// Start points tried per road before giving up.
    pub attempts: usize,
}

impl Default for PathfindConfig {
    fn default() -> Self {
        Self {
            resolution: 8,
            inflate_radius: 2,
            inflate_cost: 6,
            town_size: 6,
            town_spacing: 2,
            town_samples: 24,
            attempts: 8,
        }
    }
}

impl PathfindConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution == 0 {
            return Err(ConfigError::invalid("roads.resolution", "must be at least 1"));
        }
        if self.town_spacing == 0 {
            return Err(ConfigError::invalid("roads.town_spacing", "must be at least 1"));
        }
        if self.attempts == 0 {
            return Err(ConfigError::invalid("roads.attempts", "must be at least 1"));
        }
        Ok(())
    }
}

struct Pathfinder<'a> {
    config: &'a PathfindConfig,
    classes: &'a RoadClasses,
    grid: CostGrid,
    rng: ChaCha8Rng,
    network: RoadNetwork,
    /// Cells covered by any placed road.
    occupied: Mask,
    town: Mask,
}

pub(super) fn plan(
    config: &PathfindConfig,
    classes: &RoadClasses,
    cost: &CostMap,
    rng: ChaCha8Rng,
) -> RoadNetwork {
    let grid = CostGrid::from_map(cost, config.resolution);
    let (cols, rows) = (grid.cols() as u32, grid.rows() as u32);
    let mut pf = Pathfinder {
        config,
        classes,
        grid,
        rng,
        network: RoadNetwork::new(cost.width(), cost.height()),
        occupied: Mask::new(cols, rows),
        town: Mask::new(cols, rows),
    };

    for i in 0..classes.highway.count {
        // Alternate west->east and north->south.
        let vertical = i % 2 == 1;
        match (0..config.attempts).find_map(|_| pf.edge_path(vertical)) {
            Some(path) => pf.commit(RoadClass::Highway, &path, Some(vertical)),
            None => debug!(vertical, "no highway route found"),
        }
    }

    pf.stamp_town();

    for _ in 0..classes.major.count {
        match (0..config.attempts).find_map(|_| pf.major_path()) {
            Some(path) => pf.commit(RoadClass::Major, &path, None),
            None => debug!("major road skipped"),
        }
    }

    for _ in 0..classes.side.count {
        match (0..config.attempts).find_map(|_| pf.spur_path()) {
            Some(path) => pf.commit(RoadClass::Side, &path, None),
            None => debug!("side spur skipped"),
        }
    }

    pf.network
}

impl Pathfinder<'_> {
    fn successors(&self, c: Node, diagonal: bool) -> Vec<(Node, u32)> {
        let dirs: &[(i32, i32)] = if diagonal { &NEIGHBORS_8 } else { &NEIGHBORS_4 };
        dirs.iter()
            .filter_map(|&(dx, dy)| {
                let n = (c.0 + dx, c.1 + dy);
                let cost = self.grid.cost(n)?;
                let step = if dx != 0 && dy != 0 { DIAGONAL } else { STRAIGHT };
                Some((n, cost.saturating_mul(step)))
            })
            .collect()
    }

    fn random_cell(&mut self) -> Node {
        (
            self.rng.gen_range(0..self.grid.cols()),
            self.rng.gen_range(0..self.grid.rows()),
        )
    }

    fn edge_path(&mut self, vertical: bool) -> Option<Vec<Node>> {
        let (cols, rows) = (self.grid.cols(), self.grid.rows());
        let start = if vertical {
            (self.rng.gen_range(0..cols), 0)
        } else {
            (0, self.rng.gen_range(0..rows))
        };
        self.grid.cost(start)?;
        let diagonal = self.classes.highway.angle_mode.diagonal_moves();
        let unit = self.grid.min_cost() * STRAIGHT;
        let (path, _) = astar(
            &start,
            |&c| self.successors(c, diagonal),
            |&(x, y)| {
                let remaining = if vertical { rows - 1 - y } else { cols - 1 - x };
                remaining.max(0) as u32 * unit
            },
            |&(x, y)| if vertical { y == rows - 1 } else { x == cols - 1 },
        )?;
        Some(path)
    }

    /// Streets around the lowest-cost sampled interior cell, emitted as main roads.
    fn stamp_town(&mut self) {
        let (cols, rows) = (self.grid.cols(), self.grid.rows());
        let (x0, x1) = (cols / 5, (cols * 4 / 5).max(cols / 5 + 1));
        let (y0, y1) = (rows / 5, (rows * 4 / 5).max(rows / 5 + 1));
        let mut best: Option<(u32, Node)> = None;
        for _ in 0..self.config.town_samples {
            let c = (self.rng.gen_range(x0..x1), self.rng.gen_range(y0..y1));
            if let Some(cost) = self.grid.cost(c)
                && best.is_none_or(|(b, _)| cost < b)
            {
                best = Some((cost, c));
            }
        }
        let Some((_, (cx, cy))) = best else {
            debug!("no site for a town");
            return;
        };

        let half = (self.config.town_size / 2) as i32;
        let spacing = self.config.town_spacing as usize;
        let mut streets = Vec::new();
        for offset in (-half..=half).step_by(spacing) {
            streets.push((-half..=half).map(|t| (cx + t, cy + offset)).collect::<Vec<_>>());
            streets.push((-half..=half).map(|t| (cx + offset, cy + t)).collect::<Vec<_>>());
        }
        let runs: Vec<Vec<Node>> = streets
            .iter()
            .flat_map(|street| street.split(|&c| self.grid.cost(c).is_none()))
            .filter(|run| run.len() >= 2)
            .map(<[Node]>::to_vec)
            .collect();
        for run in &runs {
            for &(x, y) in run {
                self.town.set(x as u32, y as u32, true);
            }
            self.commit(RoadClass::Main, run, None);
        }
        debug!(cx, cy, streets = runs.len(), "town stamped");
    }

    fn major_path(&mut self) -> Option<Vec<Node>> {
        let into_town = self.town.count() > 0;
        if !into_town && self.occupied.count() == 0 {
            return None;
        }
        let samples: Vec<Node> = (0..4).map(|_| self.random_cell()).collect();
        let targets = if into_town { &self.town } else { &self.occupied };
        // Cheapest of a few random samples.
        let start = samples
            .into_iter()
            .filter(|&c| !targets.get_signed(c.0, c.1))
            .filter_map(|c| self.grid.cost(c).map(|cost| (cost, c)))
            .min_by_key(|&(cost, _)| cost)
            .map(|(_, c)| c)?;
        let diagonal = self.classes.major.angle_mode.diagonal_moves();
        let (path, _) = dijkstra(
            &start,
            |&c| self.successors(c, diagonal),
            |&(x, y)| targets.get_signed(x, y),
        )?;
        Some(path)
    }

    fn spur_path(&mut self) -> Option<Vec<Node>> {
        if self.occupied.count() == 0 {
            return None;
        }
        let start = self.random_cell();
        if self.occupied.get_signed(start.0, start.1) {
            return None;
        }
        self.grid.cost(start)?;
        let diagonal = self.classes.side.angle_mode.diagonal_moves();
        let (path, _) = dijkstra(
            &start,
            |&c| self.successors(c, diagonal),
            |&(x, y)| self.occupied.get_signed(x, y),
        )?;
        Some(path)
    }

    /// Records a cell path as a polyline and makes its surroundings costlier.
    fn commit(&mut self, class: RoadClass, path: &[Node], extend_vertical: Option<bool>) {
        if path.len() < 2 {
            return;
        }
        self.grid
            .inflate(path, self.config.inflate_radius, self.config.inflate_cost);
        for &(x, y) in path {
            self.occupied.set(x as u32, y as u32, true);
        }

        let (w, h) = (self.network.width, self.network.height);
        let mut points: Vec<Vec2> = simplify(path)
            .into_iter()
            .map(|c| self.grid.center(c, w, h))
            .collect();
        // Edge stubs continue the end cells' axis so snapped modes stay snapped.
        let ends = points.first().copied().zip(points.last().copied());
        if let (Some(vertical), Some((first, last))) = (extend_vertical, ends) {
            let (start, end) = if vertical {
                (Vec2::new(first.x, 0.0), Vec2::new(last.x, h.saturating_sub(1) as f32))
            } else {
                (Vec2::new(0.0, first.y), Vec2::new(w.saturating_sub(1) as f32, last.y))
            };
            if start != first {
                points.insert(0, start);
            }
            if end != last {
                points.push(end);
            }
        }
        self.network.add_polyline(class, points);
    }
}

/// Drops interior cells where the path keeps its direction.
fn simplify(path: &[Node]) -> Vec<Node> {
    if path.len() < 3 {
        return path.to_vec();
    }
    let mut out = vec![path[0]];
    for w in path.windows(3) {
        let d1 = (w[1].0 - w[0].0, w[1].1 - w[0].1);
        let d2 = (w[2].0 - w[1].0, w[2].1 - w[1].1);
        if d1 != d2 {
            out.push(w[1]);
        }
    }
    out.push(path[path.len() - 1]);
    out
}
