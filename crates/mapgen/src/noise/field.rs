//! Noise fields evaluated over a canvas cell.

use serde::{Deserialize, Serialize};

use super::fractal::NoiseSampler;
use crate::config::Cell;
use crate::parallel::map_ranges;
use crate::raster::Grid;

/// Rotation around the canvas centre followed by a translation, applied to the
/// global coordinate before the noise lookup.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleTransform {
    pub rotation_degrees: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl SampleTransform {
    pub fn apply(&self, x: f64, y: f64, center: (f64, f64)) -> (f64, f64) {
        let (sin, cos) = self.rotation_degrees.to_radians().sin_cos();
        let (dx, dy) = (x - center.0, y - center.1);
        (
            center.0 + dx * cos - dy * sin + self.offset_x,
            center.1 + dx * sin + dy * cos + self.offset_y,
        )
    }
}

/// Samples `sampler` at every pixel of `cell`, split across `workers` column ranges.
///
/// The result is row-major with the cell's dimensions.
pub fn compute_field(
    cell: &Cell,
    sampler: &NoiseSampler,
    transform: Option<&SampleTransform>,
    workers: usize,
) -> Grid<f32> {
    let (w, h) = (cell.width, cell.height);
    let center = cell.canvas_center();

    // Column-major output: each worker fills whole columns.
    let columns = map_ranges(w as usize, workers, |cols| {
        let mut out = Vec::with_capacity(cols.len() * h as usize);
        for x in cols {
            for y in 0..h {
                let (gx, gy) = cell.global(x as u32, y);
                let (sx, sy) = match transform {
                    Some(t) => t.apply(gx, gy, center),
                    None => (gx, gy),
                };
                out.push(sampler.sample(sx, sy) as f32);
            }
        }
        out
    });

    Grid::from_fn(w, h, |x, y| columns[x as usize * h as usize + y as usize])
}

/// Maps a raw [-1, 1] field to [0, 1] with the fixed affine map.
pub fn to_unit(v: f32) -> f32 {
    ((v + 1.0) * 0.5).clamp(0.0, 1.0)
}

/// Rescales a field to [0, 1] over its own min/max. A flat field maps to 0.
pub fn normalize_min_max(field: &Grid<f32>) -> Grid<f32> {
    let (min, max) = field
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = max - min;
    if !(span > f32::EPSILON) {
        return field.map(|_| 0.0);
    }
    field.map(|&v| (v - min) / span)
}
