//! Boundary perturbation passes run after terrain painting.
//!
//! Every pass reads a snapshot of the labels and draws its randomness from a hash
//! of the global pixel coordinate, so results do not depend on iteration order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Cell;
use crate::error::ConfigError;
use crate::noise::{derive_seed, hash_coords, hash01};
use crate::raster::{Grid, NEIGHBORS_4, NEIGHBORS_8};

/// One toggleable pass.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostPass {
    pub enabled: bool,
    /// 0..=1; meaning depends on the pass.
    pub strength: f32,
}

impl PostPass {
    pub fn on(strength: f32) -> Self {
        Self {
            enabled: true,
            strength,
        }
    }

    fn active(&self) -> bool {
        self.enabled && self.strength > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainPostConfig {
    /// Boundary pixels copy a neighbour's label with probability `strength`.
    pub ragging: PostPass,
    /// Any pixel copies a label from up to two pixels away with probability `strength`.
    pub speckle: PostPass,
    /// Pixels adopt the 3x3 majority; higher strength needs fewer agreeing neighbours.
    pub erosion: PostPass,
}

impl TerrainPostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, pass) in [
            ("ragging", self.ragging),
            ("speckle", self.speckle),
            ("erosion", self.erosion),
        ] {
            if !(0.0..=1.0).contains(&pass.strength) {
                return Err(ConfigError::invalid(
                    format!("terrain.post.{name}.strength"),
                    "must be within 0..=1",
                ));
            }
        }
        Ok(())
    }

    pub(super) fn run(&self, labels: Grid<u16>, cell: &Cell, master_seed: u64) -> Grid<u16> {
        let mut labels = labels;
        if self.ragging.active() {
            labels = rag_edges(&labels, cell, derive_seed(master_seed, "terrain.post.ragging"), self.ragging.strength);
            debug!("terrain edge ragging applied");
        }
        if self.speckle.active() {
            labels = speckle(&labels, cell, derive_seed(master_seed, "terrain.post.speckle"), self.speckle.strength);
            debug!("terrain speckle applied");
        }
        if self.erosion.active() {
            labels = erode(&labels, self.erosion.strength);
            debug!("terrain erosion applied");
        }
        labels
    }
}

fn global(cell: &Cell, x: u32, y: u32) -> (i64, i64) {
    ((cell.offset_x + x) as i64, (cell.offset_y + y) as i64)
}

fn rag_edges(src: &Grid<u16>, cell: &Cell, seed: u32, strength: f32) -> Grid<u16> {
    let seed = seed as u64;
    Grid::from_fn(src.width(), src.height(), |x, y| {
        let own = *src.get(x, y);
        let (xi, yi) = (x as i32, y as i32);
        let boundary = NEIGHBORS_4
            .iter()
            .any(|(dx, dy)| src.get_signed(xi + dx, yi + dy).is_some_and(|&n| n != own));
        let (gx, gy) = global(cell, x, y);
        if !boundary || hash01(seed, gx, gy) >= strength as f64 {
            return own;
        }
        let (dx, dy) = NEIGHBORS_8[(hash_coords(seed ^ 0xA5A5, gx, gy) % 8) as usize];
        src.get_signed(xi + dx, yi + dy).copied().unwrap_or(own)
    })
}

fn speckle(src: &Grid<u16>, cell: &Cell, seed: u32, strength: f32) -> Grid<u16> {
    let seed = seed as u64;
    Grid::from_fn(src.width(), src.height(), |x, y| {
        let own = *src.get(x, y);
        let (gx, gy) = global(cell, x, y);
        if hash01(seed, gx, gy) >= strength as f64 {
            return own;
        }
        let h = hash_coords(seed ^ 0x5A5A, gx, gy);
        let dx = (h % 5) as i32 - 2;
        let dy = ((h >> 8) % 5) as i32 - 2;
        src.get_signed(x as i32 + dx, y as i32 + dy).copied().unwrap_or(own)
    })
}

fn erode(src: &Grid<u16>, strength: f32) -> Grid<u16> {
    // strength 0 -> all 8 neighbours must agree, strength 1 -> 5 suffice.
    let needed = 8 - (strength * 3.0).round() as usize;
    Grid::from_fn(src.width(), src.height(), |x, y| {
        let own = *src.get(x, y);
        let mut counts: Vec<(u16, usize)> = Vec::with_capacity(8);
        for (dx, dy) in NEIGHBORS_8 {
            if let Some(&n) = src.get_signed(x as i32 + dx, y as i32 + dy) {
                match counts.iter_mut().find(|(id, _)| *id == n) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((n, 1)),
                }
            }
        }
        // Ties resolve to the lowest label id.
        let best = counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
        match best {
            Some(&(id, c)) if id != own && c >= needed => id,
            _ => own,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Canvas;

    fn halves(w: u32, h: u32) -> Grid<u16> {
        Grid::from_fn(w, h, |x, _| u16::from(x >= w / 2))
    }

    #[test]
    fn test_disabled_passes_are_noop() {
        let cell = Canvas::single(16, 16).full();
        let labels = halves(16, 16);
        let out = TerrainPostConfig::default().run(labels.clone(), &cell, 1);
        assert_eq!(out, labels);
    }

    #[test]
    fn test_ragging_only_touches_boundary() {
        let cell = Canvas::single(20, 10).full();
        let labels = halves(20, 10);
        let out = rag_edges(&labels, &cell, 4, 1.0);
        for (x, y, &v) in out.enumerate() {
            if !(9..=10).contains(&x) {
                assert_eq!(v, *labels.get(x, y));
            }
        }
        assert_ne!(out, labels);
    }

    #[test]
    fn test_post_is_repeatable() {
        let cell = Canvas::single(24, 24).full();
        let config = TerrainPostConfig {
            ragging: PostPass::on(0.6),
            speckle: PostPass::on(0.2),
            erosion: PostPass::on(0.5),
        };
        let a = config.run(halves(24, 24), &cell, 77);
        let b = config.run(halves(24, 24), &cell, 77);
        assert_eq!(a, b);
    }

    #[test]
    fn test_erosion_removes_isolated_pixel() {
        let mut labels = Grid::filled(5, 5, 0u16);
        labels.set(2, 2, 3);
        let out = erode(&labels, 0.0);
        assert_eq!(*out.get(2, 2), 0);
    }

    #[test]
    fn test_strength_out_of_range_rejected() {
        let config = TerrainPostConfig {
            speckle: PostPass::on(1.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
