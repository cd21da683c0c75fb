//! Stochastic hierarchical road walk.

use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cost::{CostMap, to_pixel};
use super::{
    AngleMode, ParkingLot, RoadClass, RoadClassConfig, RoadClasses, RoadNetwork, segment_distance,
    undirected_angle_between,
};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Segment endpoints snap to multiples of this many pixels; 0 disables snapping.
    pub grid_snap: f32,
    /// Highest mean traversal cost a single step may cross.
    pub cost_ceiling: f32,
    /// Turn range in degrees for free-heading classes.
    pub turn_jitter_degrees: [f32; 2],
    /// Consecutive rejected steps before a road is abandoned.
    pub max_failed_attempts: usize,
    /// Same-class segments within this heading difference count as parallel.
    pub parallel_degrees: f32,
    /// Parking lot side length range in pixels.
    pub lot_size: [u32; 2],
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            grid_snap: 2.0,
            cost_ceiling: 12.0,
            turn_jitter_degrees: [5.0, 35.0],
            max_failed_attempts: 12,
            parallel_degrees: 30.0,
            lot_size: [8, 18],
        }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_snap < 0.0 {
            return Err(ConfigError::invalid("roads.grid_snap", "must not be negative"));
        }
        if !(self.cost_ceiling > 0.0) {
            return Err(ConfigError::invalid("roads.cost_ceiling", "must be positive"));
        }
        let [lo, hi] = self.turn_jitter_degrees;
        if !(0.0 <= lo && lo <= hi && hi <= 180.0) {
            return Err(ConfigError::invalid(
                "roads.turn_jitter_degrees",
                "must be an ascending range within 0..=180",
            ));
        }
        if !(0.0..=90.0).contains(&self.parallel_degrees) {
            return Err(ConfigError::invalid("roads.parallel_degrees", "must be within 0..=90"));
        }
        let [lo, hi] = self.lot_size;
        if lo == 0 || lo > hi {
            return Err(ConfigError::invalid(
                "roads.lot_size",
                "must be an ascending range of positive sizes",
            ));
        }
        Ok(())
    }
}

struct Walker<'a> {
    config: &'a WalkConfig,
    cost: &'a CostMap,
    rng: ChaCha8Rng,
    network: RoadNetwork,
    max: Vec2,
}

pub(super) fn plan(
    config: &WalkConfig,
    classes: &RoadClasses,
    cost: &CostMap,
    rng: ChaCha8Rng,
) -> RoadNetwork {
    let mut walker = Walker {
        config,
        cost,
        rng,
        network: RoadNetwork::new(cost.width(), cost.height()),
        max: Vec2::new(
            cost.width().saturating_sub(1) as f32,
            cost.height().saturating_sub(1) as f32,
        ),
    };

    for class in RoadClass::HIERARCHY {
        let style = classes.get(class);
        let starts = walker.starts(class, style);
        let mut used = 0usize;
        let mut roads = 0usize;
        for (origin, heading) in starts {
            if used >= style.max_segments {
                debug!(class = class.name(), "segment budget exhausted");
                break;
            }
            let added = walker.walk(class, style, origin, heading, style.max_segments - used);
            if added > 0 {
                used += added;
                roads += 1;
            }
        }
        debug!(class = class.name(), roads, segments = used, "class walked");
    }
    walker.network
}

impl Walker<'_> {
    /// Start points and headings for one class.
    fn starts(&mut self, class: RoadClass, style: &RoadClassConfig) -> Vec<(Vec2, f32)> {
        let parents: Vec<(Vec2, f32)> = match class.parent() {
            Some(parent) => self
                .network
                .segments
                .iter()
                .filter(|s| s.class == parent)
                .map(|s| (s.midpoint(), s.heading()))
                .collect(),
            None => return (0..style.count).filter_map(|_| self.edge_start()).collect(),
        };

        if parents.is_empty() {
            debug!(class = class.name(), "no parent roads, starting from interior points");
            return (0..style.count).filter_map(|_| self.interior_start()).collect();
        }

        let mut starts = Vec::new();
        for (mid, heading) in parents {
            if self.rng.r#gen::<f32>() < style.spawn_probability {
                let side = if self.rng.r#gen::<bool>() { 1.0 } else { -1.0 };
                starts.push((mid, heading + side * PI / 2.0));
            }
        }
        starts
    }

    fn edge_start(&mut self) -> Option<(Vec2, f32)> {
        for _ in 0..16 {
            let t = self.rng.gen_range(0.1f32..0.9);
            let (p, heading) = match self.rng.gen_range(0..4) {
                0 => (Vec2::new(0.0, t * self.max.y), 0.0),
                1 => (Vec2::new(self.max.x, t * self.max.y), PI),
                2 => (Vec2::new(t * self.max.x, 0.0), PI / 2.0),
                _ => (Vec2::new(t * self.max.x, self.max.y), -PI / 2.0),
            };
            let p = p.round();
            let (x, y) = to_pixel(p);
            if self.cost.at(x, y).is_some() {
                return Some((p, heading));
            }
        }
        debug!("no passable edge start found");
        None
    }

    fn interior_start(&mut self) -> Option<(Vec2, f32)> {
        for _ in 0..16 {
            let p = Vec2::new(
                self.rng.gen_range(0.0..=self.max.x),
                self.rng.gen_range(0.0..=self.max.y),
            )
            .round();
            let (x, y) = to_pixel(p);
            if self.cost.at(x, y).is_some() {
                let heading = self.rng.gen_range(-PI..PI);
                return Some((p, heading));
            }
        }
        None
    }

    /// Walks one road and records it; returns the number of segments placed.
    fn walk(
        &mut self,
        class: RoadClass,
        style: &RoadClassConfig,
        origin: Vec2,
        heading: f32,
        budget: usize,
    ) -> usize {
        let limit = style.segments_per_road.min(budget);
        let mut points = vec![origin];
        let mut heading = style.angle_mode.snap(heading);
        let mut failures = 0usize;

        while points.len() - 1 < limit && failures < self.config.max_failed_attempts {
            let from = points[points.len() - 1];
            let len = self
                .rng
                .gen_range(style.min_segment_length..=style.max_segment_length);
            let mut to = self.snap(from + Vec2::from_angle(heading) * len);
            let mut reached_edge = false;
            if !self.in_canvas(to) {
                // Highways run out to the canvas edge; other classes turn back.
                if class == RoadClass::Highway {
                    to = self.clip(from, to);
                    reached_edge = true;
                } else {
                    to = from;
                }
            }

            if self.accept(class, style, from, to) {
                points.push(to);
                if matches!(class, RoadClass::Major | RoadClass::Main)
                    && self.rng.r#gen::<f32>() < style.lot_probability
                {
                    self.drop_lot(style, from, to);
                }
                if reached_edge {
                    break;
                }
                heading = self.next_heading(style.angle_mode, heading, false);
                failures = 0;
            } else {
                failures += 1;
                heading = self.next_heading(style.angle_mode, heading, true);
            }
        }

        if failures >= self.config.max_failed_attempts {
            debug!(class = class.name(), placed = points.len() - 1, "walk gave up");
        }
        let placed = points.len() - 1;
        self.network.add_polyline(class, points);
        placed
    }

    fn accept(&self, class: RoadClass, style: &RoadClassConfig, from: Vec2, to: Vec2) -> bool {
        if from.distance(to) < 1.0 {
            return false;
        }
        match self.cost.mean_along(from, to) {
            Some(mean) if mean <= self.config.cost_ceiling => {}
            _ => return false,
        }
        let d = to - from;
        let heading = d.y.atan2(d.x);
        let parallel = self.config.parallel_degrees.to_radians();
        !self.network.segments.iter().any(|s| {
            s.class == class
                && undirected_angle_between(s.heading(), heading) <= parallel
                && segment_distance(s.a, s.b, from, to) < style.separation
        })
    }

    fn next_heading(&mut self, mode: AngleMode, heading: f32, rejected: bool) -> f32 {
        let sign = if self.rng.r#gen::<bool>() { 1.0 } else { -1.0 };
        match mode.unit() {
            None => {
                let [lo, hi] = self.config.turn_jitter_degrees;
                heading + sign * self.rng.gen_range(lo..=hi).to_radians()
            }
            Some(unit) => {
                let steps = if rejected {
                    // Never a full reversal.
                    let max = ((PI / unit).round() as i32 - 1).max(1);
                    self.rng.gen_range(1..=max) as f32 * sign
                } else {
                    self.rng.gen_range(-1..=1) as f32
                };
                mode.snap(heading + steps * unit)
            }
        }
    }

    fn drop_lot(&mut self, style: &RoadClassConfig, from: Vec2, to: Vec2) {
        let [lo, hi] = self.config.lot_size;
        let w = self.rng.gen_range(lo..=hi);
        let h = self.rng.gen_range(lo..=hi);
        let side = if self.rng.r#gen::<bool>() { 1.0 } else { -1.0 };
        let normal = (to - from).normalize_or_zero().perp() * side;
        let offset = style.width as f32 / 2.0 + 2.0 + w.max(h) as f32 / 2.0;
        let centre = (from + to) * 0.5 + normal * offset;
        let x = (centre.x - w as f32 / 2.0).round() as i32;
        let y = (centre.y - h as f32 / 2.0).round() as i32;

        let (cw, ch) = (self.cost.width() as i32, self.cost.height() as i32);
        if x < 0 || y < 0 || x + w as i32 > cw || y + h as i32 > ch {
            return;
        }
        let (x1, y1) = (x + w as i32 - 1, y + h as i32 - 1);
        let probes = [(x, y), (x1, y), (x, y1), (x1, y1), to_pixel(centre)];
        if probes.iter().any(|&(px, py)| self.cost.at(px, py).is_none()) {
            return;
        }
        self.network.lots.push(ParkingLot {
            x,
            y,
            width: w,
            height: h,
        });
    }

    fn snap(&self, p: Vec2) -> Vec2 {
        let g = self.config.grid_snap;
        if g > 0.0 { (p / g).round() * g } else { p.round() }
    }

    fn in_canvas(&self, p: Vec2) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.max.x && p.y <= self.max.y
    }

    /// Shortens `from -> to` so it ends on the canvas border.
    fn clip(&self, from: Vec2, to: Vec2) -> Vec2 {
        let d = to - from;
        let mut t = 1.0f32;
        for (start, delta, max) in [(from.x, d.x, self.max.x), (from.y, d.y, self.max.y)] {
            if delta > 0.0 {
                t = t.min((max - start) / delta);
            } else if delta < 0.0 {
                t = t.min(-start / delta);
            }
        }
        (from + d * t.max(0.0)).round().clamp(Vec2::ZERO, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::phase_rng;
    use crate::raster::Grid;

    fn flat_cost(w: u32, h: u32) -> CostMap {
        CostMap::from_grid(Grid::filled(w, h, Some(1)))
    }

    #[test]
    fn test_walk_is_deterministic() {
        let cost = flat_cost(160, 160);
        let classes = RoadClasses::default();
        let config = WalkConfig::default();
        let a = plan(&config, &classes, &cost, phase_rng(3, "roads.walk"));
        let b = plan(&config, &classes, &cost, phase_rng(3, "roads.walk"));
        assert_eq!(a, b);
        assert!(a.of_class(RoadClass::Highway).count() > 0);
    }

    #[test]
    fn test_points_stay_in_canvas() {
        let cost = flat_cost(120, 90);
        let net = plan(
            &WalkConfig::default(),
            &RoadClasses::default(),
            &cost,
            phase_rng(9, "roads.walk"),
        );
        for poly in &net.polylines {
            for p in &poly.points {
                assert!(p.x >= 0.0 && p.y >= 0.0 && p.x <= 119.0 && p.y <= 89.0);
            }
        }
    }

    #[test]
    fn test_class_budget_respected() {
        let cost = flat_cost(200, 200);
        let mut classes = RoadClasses::default();
        classes.highway.count = 4;
        classes.highway.max_segments = 5;
        let net = plan(&WalkConfig::default(), &classes, &cost, phase_rng(1, "roads.walk"));
        assert!(net.segment_count(RoadClass::Highway) <= 5);
    }

    #[test]
    fn test_right_angle_roads_stay_axis_aligned() {
        let cost = flat_cost(200, 200);
        let mut classes = RoadClasses::default();
        classes.highway.angle_mode = AngleMode::Right;
        let config = WalkConfig {
            grid_snap: 0.0,
            ..Default::default()
        };
        let net = plan(&config, &classes, &cost, phase_rng(5, "roads.walk"));
        for (a, b) in net.of_class(RoadClass::Highway).flat_map(|p| p.segments()) {
            assert!((a.x - b.x).abs() < 0.5 || (a.y - b.y).abs() < 0.5);
        }
    }

    #[test]
    fn test_lots_follow_major_and_main_roads() {
        // Left strip is water; lots must land wholly on the passable side.
        let cost = CostMap::from_grid(Grid::from_fn(320, 320, |x, _| (x >= 40).then_some(1)));
        let mut classes = RoadClasses::default();
        for class in [RoadClass::Major, RoadClass::Main] {
            let style = classes.get_mut(class);
            style.lot_probability = 1.0;
            style.spawn_probability = 1.0;
        }
        let config = WalkConfig::default();
        let mut placed = 0;
        for seed in 0..8 {
            let net = plan(&config, &classes, &cost, phase_rng(seed, "roads.walk"));
            for lot in &net.lots {
                assert!(lot.x >= 0 && lot.y >= 0);
                assert!(lot.x + lot.width as i32 <= 320 && lot.y + lot.height as i32 <= 320);
                for y in lot.y..lot.y + lot.height as i32 {
                    for x in lot.x..lot.x + lot.width as i32 {
                        assert!(cost.at(x, y).is_some());
                    }
                }
            }
            placed += net.lots.len();
        }
        assert!(placed > 0);
    }

    #[test]
    fn test_other_classes_never_drop_lots() {
        let cost = flat_cost(320, 320);
        let mut classes = RoadClasses::default();
        for class in [RoadClass::Highway, RoadClass::Side] {
            classes.get_mut(class).lot_probability = 1.0;
        }
        classes.major.lot_probability = 0.0;
        classes.main.lot_probability = 0.0;
        for seed in 0..4 {
            let net = plan(&WalkConfig::default(), &classes, &cost, phase_rng(seed, "roads.walk"));
            assert!(net.segment_count(RoadClass::Highway) > 0);
            assert!(net.lots.is_empty());
        }
    }

    #[test]
    fn test_impassable_canvas_places_nothing() {
        let cost = CostMap::from_grid(Grid::filled(64, 64, None));
        let net = plan(
            &WalkConfig::default(),
            &RoadClasses::default(),
            &cost,
            phase_rng(2, "roads.walk"),
        );
        assert!(net.polylines.is_empty());
        assert!(net.lots.is_empty());
    }

    #[test]
    fn test_parallel_same_class_separated() {
        let cost = flat_cost(240, 240);
        let classes = RoadClasses::default();
        let config = WalkConfig::default();
        let net = plan(&config, &classes, &cost, phase_rng(11, "roads.walk"));
        let limit = config.parallel_degrees.to_radians();
        for (i, s) in net.segments.iter().enumerate() {
            for t in &net.segments[i + 1..] {
                if s.class != t.class || s.road == t.road {
                    continue;
                }
                if undirected_angle_between(s.heading(), t.heading()) <= limit {
                    let sep = classes.get(s.class).separation;
                    assert!(segment_distance(s.a, s.b, t.a, t.b) >= sep);
                }
            }
        }
    }
}
