//! Noise field engine.
//!
//! This module provides the coherent noise every other stage builds on:
//! - [`NoiseSampler`]: fractal Perlin noise with optional domain warping
//! - [`compute_field`]: a sampler evaluated over a canvas cell in parallel
//! - [`derive_seed`] / [`hash01`] / [`phase_rng`]: stable, process-independent seeding

mod field;
mod fractal;
mod seed;

pub use field::{SampleTransform, compute_field, normalize_min_max, to_unit};
pub use fractal::{NoiseSampler, NoiseSpec, WarpSpec};
pub use seed::{derive_seed, fnv1a, hash01, hash_coords, phase_rng, splitmix64};
