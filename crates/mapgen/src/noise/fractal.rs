//! Perlin noise-based fractal sampling with optional domain warping.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use super::seed::derive_seed;
use crate::error::ConfigError;

/// Offset between the two warp lookups so they decorrelate.
const WARP_OFFSET: (f64, f64) = (31.7, 47.3);

/// Parameters of one fractal noise field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSpec {
    /// Feature size in pixels; coordinates are divided by this.
    pub scale: f64,
    /// Number of noise octaves for detail.
    pub octaves: u32,
    /// Amplitude multiplier applied each octave.
    pub persistence: f64,
    /// Frequency multiplier applied each octave.
    pub lacunarity: f64,
    /// Explicit seed. When absent the seed is derived from the owner's name.
    pub seed: Option<u32>,
    pub warp: Option<WarpSpec>,
}

impl Default for NoiseSpec {
    fn default() -> Self {
        Self {
            scale: 100.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            seed: None,
            warp: None,
        }
    }
}

/// Domain warp parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpSpec {
    /// Maximum coordinate displacement in pixels.
    pub amount: f64,
    /// Feature size of the warp field in pixels.
    pub scale: f64,
    pub seed: Option<u32>,
}

impl Default for WarpSpec {
    fn default() -> Self {
        Self {
            amount: 0.0,
            scale: 200.0,
            seed: None,
        }
    }
}

impl NoiseSpec {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    pub fn with_octaves(mut self, octaves: u32) -> Self {
        self.octaves = octaves;
        self
    }

    pub fn with_persistence(mut self, persistence: f64) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_lacunarity(mut self, lacunarity: f64) -> Self {
        self.lacunarity = lacunarity;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_warp(mut self, amount: f64, scale: f64) -> Self {
        self.warp = Some(WarpSpec {
            amount,
            scale,
            seed: None,
        });
        self
    }

    /// Explicit seed, or one derived from the master seed and `name`.
    pub fn resolve_seed(&self, master: u64, name: &str) -> u32 {
        self.seed.unwrap_or_else(|| derive_seed(master, name))
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(ConfigError::invalid(format!("{field}.scale"), "must be positive"));
        }
        if self.octaves == 0 {
            return Err(ConfigError::invalid(format!("{field}.octaves"), "must be at least 1"));
        }
        if !(self.lacunarity > 0.0) {
            return Err(ConfigError::invalid(
                format!("{field}.lacunarity"),
                "must be positive",
            ));
        }
        if !(self.persistence >= 0.0) {
            return Err(ConfigError::invalid(
                format!("{field}.persistence"),
                "must not be negative",
            ));
        }
        if let Some(warp) = &self.warp
            && warp.amount > 0.0
            && !(warp.scale > 0.0)
        {
            return Err(ConfigError::invalid(format!("{field}.warp.scale"), "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Warp {
    perlin: Perlin,
    amount: f64,
    scale: f64,
}

/// A seeded, ready-to-sample noise field.
///
/// `sample` is a pure function of the coordinates, the `NoiseSpec` and the seed.
#[derive(Debug, Clone)]
pub struct NoiseSampler {
    perlin: Perlin,
    scale: f64,
    octaves: u32,
    persistence: f64,
    lacunarity: f64,
    warp: Option<Warp>,
}

impl NoiseSampler {
    pub fn new(spec: &NoiseSpec, seed: u32) -> Self {
        let warp = spec
            .warp
            .as_ref()
            .filter(|w| w.amount > 0.0)
            .map(|w| Warp {
                perlin: Perlin::new(w.seed.unwrap_or(seed.wrapping_add(0x5EED))),
                amount: w.amount,
                scale: w.scale,
            });
        Self {
            perlin: Perlin::new(seed),
            scale: spec.scale,
            octaves: spec.octaves.max(1),
            persistence: spec.persistence,
            lacunarity: spec.lacunarity,
            warp,
        }
    }

    /// Noise value in [-1, 1] at pixel coordinate (x, y).
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (x, y) = match &self.warp {
            Some(w) => {
                let (u, v) = (x / w.scale, y / w.scale);
                let dx = fbm(&w.perlin, u, v, 2, 0.5, 2.0);
                let dy = fbm(&w.perlin, u + WARP_OFFSET.0, v + WARP_OFFSET.1, 2, 0.5, 2.0);
                (x + dx * w.amount, y + dy * w.amount)
            }
            None => (x, y),
        };
        fbm(
            &self.perlin,
            x / self.scale,
            y / self.scale,
            self.octaves,
            self.persistence,
            self.lacunarity,
        )
    }
}

/// Fractal Brownian motion normalized by total amplitude.
fn fbm(perlin: &Perlin, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_amplitude = 0.0;

    for _ in 0..octaves {
        total += perlin.get([x * frequency, y * frequency]) * amplitude;
        max_amplitude += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    if max_amplitude > 0.0 {
        (total / max_amplitude).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_consistency() {
        let spec = NoiseSpec::new(50.0).with_octaves(5);
        let a = NoiseSampler::new(&spec, 42).sample(12.5, 40.25);
        let b = NoiseSampler::new(&spec, 42).sample(12.5, 40.25);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_sample_range() {
        let spec = NoiseSpec::new(17.0).with_octaves(6).with_warp(8.0, 40.0);
        let sampler = NoiseSampler::new(&spec, 3);
        for y in 0..50 {
            for x in 0..50 {
                let v = sampler.sample(x as f64 * 1.3, y as f64 * 0.7);
                assert!((-1.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn test_seed_changes_field() {
        let spec = NoiseSpec::new(30.0);
        let a = NoiseSampler::new(&spec, 1);
        let b = NoiseSampler::new(&spec, 2);
        let differs = (0..20).any(|i| {
            let p = i as f64 * 7.3 + 0.5;
            a.sample(p, p * 0.5) != b.sample(p, p * 0.5)
        });
        assert!(differs);
    }

    #[test]
    fn test_warp_distorts() {
        let plain = NoiseSampler::new(&NoiseSpec::new(40.0), 11);
        let warped = NoiseSampler::new(&NoiseSpec::new(40.0).with_warp(25.0, 60.0), 11);
        let differs = (0..20).any(|i| {
            let p = i as f64 * 5.1 + 0.3;
            plain.sample(p, p) != warped.sample(p, p)
        });
        assert!(differs);
    }

    #[test]
    fn test_resolve_seed_prefers_explicit() {
        let spec = NoiseSpec::new(10.0).with_seed(77);
        assert_eq!(spec.resolve_seed(1, "x"), 77);
        let derived = NoiseSpec::new(10.0);
        assert_eq!(derived.resolve_seed(1, "x"), derive_seed(1, "x"));
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        assert!(NoiseSpec::new(0.0).validate("terrain.noise").is_err());
        assert!(NoiseSpec::new(10.0).with_octaves(0).validate("n").is_err());
        assert!(NoiseSpec::new(10.0).validate("n").is_ok());
    }
}
