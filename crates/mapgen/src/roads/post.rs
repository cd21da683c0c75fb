//! Road post-processing: dirt transitions, potholes, vegetation carving.
//!
//! Order matters: transitions change which pixels are asphalt, so they run
//! before potholes are clipped to the asphalt mask.

use std::f32::consts::TAU;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RoadLayer, RoadSurface};
use crate::error::ConfigError;
use crate::layers::VegetationRaster;
use crate::noise::phase_rng;
use crate::palette::Color;
use crate::raster::{Mask, NEIGHBORS_4};
use crate::vegetation::NONE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub enabled: bool,
    /// Pixels of dirt bled into the asphalt side.
    pub strip_length: u32,
    /// Per-pixel chance of stamping along the strip.
    pub probability: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strip_length: 3,
            probability: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PotholeConfig {
    pub enabled: bool,
    pub count: usize,
    /// Base radius range in pixels.
    pub radius: [f32; 2],
    /// Polygon vertex count range.
    pub vertices: [usize; 2],
    /// Std-dev of the per-vertex radius factor.
    pub jaggedness: f32,
}

impl Default for PotholeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            count: 14,
            radius: [1.0, 3.0],
            vertices: [5, 9],
            jaggedness: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarveConfig {
    pub enabled: bool,
    /// Leave vegetation under dirt roads.
    pub skip_dirt: bool,
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_dirt: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadPostConfig {
    pub transition: TransitionConfig,
    pub potholes: PotholeConfig,
    pub carve: CarveConfig,
}

impl RoadPostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.transition.probability) {
            return Err(ConfigError::invalid(
                "road_post.transition.probability",
                "must be within 0..=1",
            ));
        }
        let [lo, hi] = self.potholes.radius;
        if !(lo > 0.0 && lo <= hi) {
            return Err(ConfigError::invalid(
                "road_post.potholes.radius",
                "must be an ascending range of positive radii",
            ));
        }
        let [lo, hi] = self.potholes.vertices;
        if lo < 3 || lo > hi {
            return Err(ConfigError::invalid(
                "road_post.potholes.vertices",
                "must be an ascending range starting at 3 or more",
            ));
        }
        if !(self.potholes.jaggedness >= 0.0) {
            return Err(ConfigError::invalid(
                "road_post.potholes.jaggedness",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

pub struct RoadPostProcessor<'a> {
    config: &'a RoadPostConfig,
    master_seed: u64,
}

impl<'a> RoadPostProcessor<'a> {
    pub fn new(config: &'a RoadPostConfig, master_seed: u64) -> Self {
        Self {
            config,
            master_seed,
        }
    }

    /// Runs the enabled passes; vegetation is carved only when supplied.
    pub fn run(&self, layer: &mut RoadLayer, vegetation: Option<&mut VegetationRaster>) {
        if self.config.transition.enabled {
            let mut rng = phase_rng(self.master_seed, "roads.post.transition");
            let stamped = sprinkle_transitions(layer, &self.config.transition, &mut rng);
            debug!(stamped, "dirt transitions sprinkled");
        }
        if self.config.potholes.enabled {
            let mut rng = phase_rng(self.master_seed, "roads.post.potholes");
            let painted = scatter_potholes(layer, &self.config.potholes, &mut rng);
            debug!(painted, "potholes scattered");
        }
        if self.config.carve.enabled
            && let Some(vegetation) = vegetation
        {
            let carved = carve_vegetation(layer, vegetation, self.config.carve.skip_dirt);
            debug!(carved, "vegetation carved under roads");
        }
    }
}

fn sprinkle_transitions(layer: &mut RoadLayer, config: &TransitionConfig, rng: &mut ChaCha8Rng) -> usize {
    let surface = layer.surface.clone();
    let source = layer.image.clone();
    let asphalt = |x: i32, y: i32| surface.get_signed(x, y) == Some(&Some(RoadSurface::Asphalt));
    let mut stamped = 0usize;

    for (x, y, s) in surface.enumerate() {
        if *s != Some(RoadSurface::Dirt) {
            continue;
        }
        let dirt = Color::from(*source.get_pixel(x, y));
        for (dx, dy) in NEIGHBORS_4 {
            for step in 1..=config.strip_length as i32 {
                let (px, py) = (x as i32 + dx * step, y as i32 + dy * step);
                if !asphalt(px, py) {
                    break;
                }
                if rng.r#gen::<f32>() < config.probability {
                    layer.image.put_pixel(px as u32, py as u32, dirt.to_rgba());
                    layer.surface.set(px as u32, py as u32, Some(RoadSurface::Dirt));
                    stamped += 1;
                }
            }
        }
    }
    stamped
}

fn scatter_potholes(layer: &mut RoadLayer, config: &PotholeConfig, rng: &mut ChaCha8Rng) -> usize {
    let paved = layer.asphalt_mask();
    let sites: Vec<(u32, u32)> = paved.iter_true().collect();
    if sites.is_empty() {
        debug!("no asphalt for potholes");
        return 0;
    }
    let spread = match Normal::new(1.0f32, config.jaggedness) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(error = %e, "invalid pothole jaggedness, using round potholes");
            None
        }
    };

    let mut painted = 0usize;
    for _ in 0..config.count {
        let (cx, cy) = sites[rng.gen_range(0..sites.len())];
        let base = rng.gen_range(config.radius[0]..=config.radius[1]);
        let n = rng.gen_range(config.vertices[0]..=config.vertices[1]);
        let polygon: Vec<(f32, f32)> = (0..n)
            .map(|i| {
                let factor = spread.map(|d| d.sample(rng)).unwrap_or(1.0).clamp(0.4, 1.6);
                let angle = TAU * i as f32 / n as f32;
                let r = base * factor;
                (cx as f32 + r * angle.cos(), cy as f32 + r * angle.sin())
            })
            .collect();

        let underlying = Color::from(*layer.image.get_pixel(cx, cy));
        let color = if underlying.luminance() < 0.5 {
            underlying.shade(1.4)
        } else {
            underlying.shade(0.6)
        };
        painted += fill_polygon(&polygon, &paved, |x, y| {
            layer.potholes.put_pixel(x, y, color.to_rgba());
        });
    }
    painted
}

/// Fills pixel centres inside the polygon (even-odd rule), clipped to `clip`.
fn fill_polygon(polygon: &[(f32, f32)], clip: &Mask, mut put: impl FnMut(u32, u32)) -> usize {
    let (mut x0, mut y0) = (f32::MAX, f32::MAX);
    let (mut x1, mut y1) = (f32::MIN, f32::MIN);
    for &(x, y) in polygon {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    let mut count = 0usize;
    for y in y0.floor() as i32..=y1.ceil() as i32 {
        for x in x0.floor() as i32..=x1.ceil() as i32 {
            if clip.get_signed(x, y) && contains(polygon, x as f32, y as f32) {
                put(x as u32, y as u32);
                count += 1;
            }
        }
    }
    count
}

fn contains(polygon: &[(f32, f32)], px: f32, py: f32) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn carve_vegetation(layer: &RoadLayer, vegetation: &mut VegetationRaster, skip_dirt: bool) -> usize {
    if vegetation.width() != layer.width() || vegetation.height() != layer.height() {
        warn!("vegetation raster size differs from roads; not carving");
        return 0;
    }
    let mut carved = 0usize;
    for (x, y, s) in layer.surface.enumerate() {
        let Some(surface) = s else { continue };
        if skip_dirt && *surface == RoadSurface::Dirt {
            continue;
        }
        if *vegetation.labels.get(x, y) != NONE {
            vegetation.set_label(x, y, NONE);
            carved += 1;
        }
    }
    carved
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::layers::{LabeledRaster, Legend, LegendEntry, Surface};
    use crate::raster::Grid;
    use crate::roads::{RoadClass, RoadClasses, RoadNetwork, rasterize};

    fn layer() -> RoadLayer {
        let mut net = RoadNetwork::new(48, 48);
        net.add_polyline(RoadClass::Major, vec![Vec2::new(0.0, 24.0), Vec2::new(47.0, 24.0)]);
        net.add_polyline(RoadClass::Side, vec![Vec2::new(24.0, 0.0), Vec2::new(24.0, 20.0)]);
        rasterize(&net, &RoadClasses::default(), Color::rgb(80, 80, 80))
    }

    fn full_vegetation(w: u32, h: u32) -> VegetationRaster {
        let mut legend = Legend::new();
        legend.push(LegendEntry {
            name: "none".into(),
            color: Color::TRANSPARENT,
            surface: Surface::Ground,
            cost: 0,
        });
        legend.push(LegendEntry {
            name: "dense".into(),
            color: Color::rgb(0, 100, 0),
            surface: Surface::Ground,
            cost: 4,
        });
        LabeledRaster::from_labels(Grid::filled(w, h, 1), legend)
    }

    #[test]
    fn test_potholes_stay_on_asphalt() {
        let mut layer = layer();
        let config = RoadPostConfig {
            potholes: PotholeConfig {
                count: 60,
                radius: [2.0, 4.0],
                ..Default::default()
            },
            ..Default::default()
        };
        RoadPostProcessor::new(&config, 3).run(&mut layer, None);
        let asphalt = layer.asphalt_mask();
        let mut any = false;
        for (x, y, p) in layer.potholes.enumerate_pixels() {
            if p.0[3] != 0 {
                any = true;
                assert!(asphalt.get(x, y));
            }
        }
        assert!(any);
    }

    #[test]
    fn test_transitions_only_touch_asphalt_next_to_dirt() {
        let mut layer = layer();
        let before = layer.surface.clone();
        let config = TransitionConfig {
            enabled: true,
            strip_length: 2,
            probability: 1.0,
        };
        let mut rng = phase_rng(1, "t");
        let stamped = sprinkle_transitions(&mut layer, &config, &mut rng);
        assert!(stamped > 0);
        for (x, y, s) in layer.surface.enumerate() {
            if *s != *before.get(x, y) {
                assert_eq!(*before.get(x, y), Some(RoadSurface::Asphalt));
                assert_eq!(*s, Some(RoadSurface::Dirt));
            }
        }
    }

    #[test]
    fn test_carve_clears_vegetation_under_roads() {
        let layer = layer();
        let mut veg = full_vegetation(48, 48);
        let carved = carve_vegetation(&layer, &mut veg, false);
        assert_eq!(carved, layer.road_mask().count());
        assert_eq!(*veg.labels.get(24, 24), NONE);
        assert_eq!(veg.image.get_pixel(24, 24).0[3], 0);
        assert_eq!(*veg.labels.get(5, 5), 1);
    }

    #[test]
    fn test_carve_can_skip_dirt() {
        let layer = layer();
        let mut veg = full_vegetation(48, 48);
        carve_vegetation(&layer, &mut veg, true);
        assert_eq!(*veg.labels.get(24, 5), 1);
        assert_eq!(*veg.labels.get(10, 24), NONE);
    }

    #[test]
    fn test_polygon_contains() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        assert!(contains(&square, 2.0, 2.0));
        assert!(!contains(&square, 5.0, 2.0));
    }

    #[test]
    fn test_bad_radius_rejected() {
        let mut config = RoadPostConfig::default();
        config.potholes.radius = [3.0, 1.0];
        assert!(config.validate().is_err());
    }
}
