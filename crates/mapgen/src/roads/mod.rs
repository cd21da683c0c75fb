//! Road network planning and rasterization.
//!
//! Roads form a strict hierarchy built top-down (highway → major → main → side)
//! by one of two planners:
//! - [`RoadAlgorithm::Walk`]: stochastic hierarchical walk with angle snapping,
//!   cost ceilings and same-class parallel separation
//! - [`RoadAlgorithm::Pathfind`]: A* over a coarse cost grid between canvas edges,
//!   a town grid, and the nearest existing road
//!
//! Both fill the same [`RoadNetwork`], which [`rasterize`] draws lowest class first.

mod cost;
mod pathfind;
pub mod post;
mod raster;
mod walk;

use std::f32::consts::PI;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use cost::{CostGrid, CostMap};
pub use pathfind::PathfindConfig;
pub use raster::{RoadLayer, rasterize};
pub use walk::WalkConfig;

use crate::error::{ConfigError, GenError};
use crate::layers::{TerrainRaster, VegetationRaster};
use crate::noise::phase_rng;
use crate::palette::Color;

/// Road tier. Ordering is draw priority: `Side < Main < Major < Highway`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Side,
    Main,
    Major,
    Highway,
}

impl RoadClass {
    /// Draw order, lowest priority first.
    pub const BY_PRIORITY: [RoadClass; 4] = [Self::Side, Self::Main, Self::Major, Self::Highway];

    /// Build order, top of the hierarchy first.
    pub const HIERARCHY: [RoadClass; 4] = [Self::Highway, Self::Major, Self::Main, Self::Side];

    pub fn parent(self) -> Option<RoadClass> {
        match self {
            Self::Highway => None,
            Self::Major => Some(Self::Highway),
            Self::Main => Some(Self::Major),
            Self::Side => Some(Self::Main),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Highway => "highway",
            Self::Major => "major",
            Self::Main => "main",
            Self::Side => "side",
        }
    }
}

/// Heading constraint of a road class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleMode {
    #[default]
    Free,
    /// Multiples of 90°.
    Right,
    /// Multiples of 45°.
    Diagonal,
}

impl AngleMode {
    /// Snap unit in radians; `None` for free headings.
    pub fn unit(self) -> Option<f32> {
        match self {
            Self::Free => None,
            Self::Right => Some(PI / 2.0),
            Self::Diagonal => Some(PI / 4.0),
        }
    }

    pub fn snap(self, heading: f32) -> f32 {
        match self.unit() {
            Some(unit) => (heading / unit).round() * unit,
            None => heading,
        }
    }

    /// Grid pathfinding moves diagonally unless headings are restricted to 90°.
    pub fn diagonal_moves(self) -> bool {
        !matches!(self, Self::Right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadSurface {
    Asphalt,
    Dirt,
}

/// Style and generation budget of one road class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadClassConfig {
    pub color: Color,
    /// Stroke width in pixels.
    pub width: u32,
    pub min_segment_length: f32,
    pub max_segment_length: f32,
    /// Segment budget for the whole class.
    pub max_segments: usize,
    /// Segment budget of a single road.
    pub segments_per_road: usize,
    /// Roads to start directly (highways, pathfinder majors and spurs, or
    /// fallback starts when the parent class is empty).
    pub count: usize,
    /// Chance that a parent segment midpoint spawns a road of this class.
    pub spawn_probability: f32,
    /// Minimum distance to a same-class segment of similar heading.
    pub separation: f32,
    pub angle_mode: AngleMode,
    pub surface: RoadSurface,
    /// Chance per accepted segment of dropping a parking lot (major/main only).
    pub lot_probability: f32,
}

impl RoadClassConfig {
    fn highway() -> Self {
        Self {
            color: Color::rgb(52, 52, 58),
            width: 7,
            min_segment_length: 40.0,
            max_segment_length: 90.0,
            max_segments: 40,
            segments_per_road: 24,
            count: 1,
            spawn_probability: 0.0,
            separation: 60.0,
            angle_mode: AngleMode::Free,
            surface: RoadSurface::Asphalt,
            lot_probability: 0.0,
        }
    }

    fn major() -> Self {
        Self {
            color: Color::rgb(78, 78, 86),
            width: 5,
            min_segment_length: 30.0,
            max_segment_length: 70.0,
            max_segments: 60,
            segments_per_road: 8,
            count: 3,
            spawn_probability: 0.3,
            separation: 40.0,
            angle_mode: AngleMode::Diagonal,
            surface: RoadSurface::Asphalt,
            lot_probability: 0.15,
        }
    }

    fn main() -> Self {
        Self {
            color: Color::rgb(108, 106, 102),
            width: 3,
            min_segment_length: 20.0,
            max_segment_length: 50.0,
            max_segments: 80,
            segments_per_road: 6,
            count: 4,
            spawn_probability: 0.35,
            separation: 25.0,
            angle_mode: AngleMode::Right,
            surface: RoadSurface::Asphalt,
            lot_probability: 0.1,
        }
    }

    fn side() -> Self {
        Self {
            color: Color::rgb(146, 116, 78),
            width: 2,
            min_segment_length: 12.0,
            max_segment_length: 35.0,
            max_segments: 120,
            segments_per_road: 5,
            count: 6,
            spawn_probability: 0.4,
            separation: 15.0,
            angle_mode: AngleMode::Free,
            surface: RoadSurface::Dirt,
            lot_probability: 0.0,
        }
    }

    fn validate(&self, class: RoadClass) -> Result<(), ConfigError> {
        let field = |f: &str| format!("roads.classes.{}.{f}", class.name());
        if self.width == 0 {
            return Err(ConfigError::invalid(field("width"), "must be at least 1"));
        }
        if !(self.min_segment_length > 0.0 && self.min_segment_length <= self.max_segment_length) {
            return Err(ConfigError::invalid(
                field("min_segment_length"),
                "must be positive and not exceed max_segment_length",
            ));
        }
        for (name, p) in [
            ("spawn_probability", self.spawn_probability),
            ("lot_probability", self.lot_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::invalid(field(name), "must be within 0..=1"));
            }
        }
        if self.separation < 0.0 {
            return Err(ConfigError::invalid(field("separation"), "must not be negative"));
        }
        Ok(())
    }
}

impl Default for RoadClassConfig {
    fn default() -> Self {
        Self::main()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadClasses {
    pub highway: RoadClassConfig,
    pub major: RoadClassConfig,
    pub main: RoadClassConfig,
    pub side: RoadClassConfig,
}

impl Default for RoadClasses {
    fn default() -> Self {
        Self {
            highway: RoadClassConfig::highway(),
            major: RoadClassConfig::major(),
            main: RoadClassConfig::main(),
            side: RoadClassConfig::side(),
        }
    }
}

impl RoadClasses {
    pub fn get(&self, class: RoadClass) -> &RoadClassConfig {
        match class {
            RoadClass::Highway => &self.highway,
            RoadClass::Major => &self.major,
            RoadClass::Main => &self.main,
            RoadClass::Side => &self.side,
        }
    }

    pub fn get_mut(&mut self, class: RoadClass) -> &mut RoadClassConfig {
        match class {
            RoadClass::Highway => &mut self.highway,
            RoadClass::Major => &mut self.major,
            RoadClass::Main => &mut self.main,
            RoadClass::Side => &mut self.side,
        }
    }
}

/// Planner selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum RoadAlgorithm {
    Walk(WalkConfig),
    Pathfind(PathfindConfig),
}

impl Default for RoadAlgorithm {
    fn default() -> Self {
        Self::Walk(WalkConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    pub enabled: bool,
    pub algorithm: RoadAlgorithm,
    pub classes: RoadClasses,
    /// Treat water as passable instead of impassable.
    pub ignore_water: bool,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: RoadAlgorithm::default(),
            classes: RoadClasses::default(),
            ignore_water: false,
        }
    }
}

impl RoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in RoadClass::HIERARCHY {
            self.classes.get(class).validate(class)?;
        }
        match &self.algorithm {
            RoadAlgorithm::Walk(walk) => walk.validate(),
            RoadAlgorithm::Pathfind(pf) => pf.validate(),
        }
    }
}

/// A straight piece of road between two pixel positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadSegment {
    pub a: Vec2,
    pub b: Vec2,
    pub class: RoadClass,
    /// Index of the polyline this segment belongs to.
    pub road: usize,
}

impl RoadSegment {
    pub fn heading(&self) -> f32 {
        let d = self.b - self.a;
        d.y.atan2(d.x)
    }

    pub fn midpoint(&self) -> Vec2 {
        (self.a + self.b) * 0.5
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadPolyline {
    pub class: RoadClass,
    /// Pixel positions, at least two.
    pub points: Vec<Vec2>,
}

impl RoadPolyline {
    pub fn segments(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

/// Axis-aligned paved rectangle next to a road.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkingLot {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Every road placed in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadNetwork {
    pub width: u32,
    pub height: u32,
    pub polylines: Vec<RoadPolyline>,
    pub segments: Vec<RoadSegment>,
    pub lots: Vec<ParkingLot>,
}

impl RoadNetwork {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Adds a polyline and its segments; ignores polylines with fewer than two points.
    pub fn add_polyline(&mut self, class: RoadClass, points: Vec<Vec2>) -> Option<usize> {
        if points.len() < 2 {
            return None;
        }
        let road = self.polylines.len();
        for w in points.windows(2) {
            self.segments.push(RoadSegment {
                a: w[0],
                b: w[1],
                class,
                road,
            });
        }
        self.polylines.push(RoadPolyline { class, points });
        Some(road)
    }

    pub fn of_class(&self, class: RoadClass) -> impl Iterator<Item = &RoadPolyline> {
        self.polylines.iter().filter(move |p| p.class == class)
    }

    pub fn segment_count(&self, class: RoadClass) -> usize {
        self.segments.iter().filter(|s| s.class == class).count()
    }
}

/// Plans the road network from the terrain and (optionally) vegetation rasters.
pub struct RoadPlanner<'a> {
    config: &'a RoadConfig,
    master_seed: u64,
}

impl<'a> RoadPlanner<'a> {
    pub fn new(config: &'a RoadConfig, master_seed: u64) -> Self {
        Self {
            config,
            master_seed,
        }
    }

    /// Fails fast without terrain; a missing vegetation raster only drops its cost.
    pub fn plan(
        &self,
        terrain: Option<&TerrainRaster>,
        vegetation: Option<&VegetationRaster>,
    ) -> Result<RoadNetwork, GenError> {
        let cost = CostMap::build(terrain, vegetation, self.config.ignore_water)?;
        let network = match &self.config.algorithm {
            RoadAlgorithm::Walk(walk) => {
                let rng = phase_rng(self.master_seed, "roads.walk");
                walk::plan(walk, &self.config.classes, &cost, rng)
            }
            RoadAlgorithm::Pathfind(pf) => {
                let rng = phase_rng(self.master_seed, "roads.pathfind");
                pathfind::plan(pf, &self.config.classes, &cost, rng)
            }
        };
        info!(
            highways = network.of_class(RoadClass::Highway).count(),
            majors = network.of_class(RoadClass::Major).count(),
            mains = network.of_class(RoadClass::Main).count(),
            sides = network.of_class(RoadClass::Side).count(),
            lots = network.lots.len(),
            "road network planned"
        );
        Ok(network)
    }
}

/// Smallest difference between two headings, ignoring direction (0..=π/2).
pub(crate) fn undirected_angle_between(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}

/// Minimum distance between segments `p1-p2` and `q1-q2`.
pub(crate) fn segment_distance(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> f32 {
    if segments_intersect(p1, p2, q1, q2) {
        return 0.0;
    }
    point_segment_distance(p1, q1, q2)
        .min(point_segment_distance(p2, q1, q2))
        .min(point_segment_distance(q1, p1, p2))
        .min(point_segment_distance(q2, p1, p2))
}

fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn segments_intersect(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = (p2 - p1).perp_dot(q1 - p1);
    let d2 = (p2 - p1).perp_dot(q2 - p1);
    let d3 = (q2 - q1).perp_dot(p1 - q1);
    let d4 = (q2 - q1).perp_dot(p2 - q1);
    (d1 * d2 < 0.0) && (d3 * d4 < 0.0)
}
