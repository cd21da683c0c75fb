//! Stable seed derivation and coordinate hashing.
//!
//! Nothing here may depend on process state: the same inputs must give the same
//! outputs on every run and every platform.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |h, &b| {
        (h ^ b as u64).wrapping_mul(FNV_PRIME)
    })
}

pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derives a per-layer noise seed from the master seed and the layer name.
pub fn derive_seed(master: u64, name: &str) -> u32 {
    (splitmix64(master ^ fnv1a(name.as_bytes())) >> 32) as u32
}

/// Deterministic RNG for one named generation phase.
pub fn phase_rng(master: u64, phase: &str) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(splitmix64(master ^ fnv1a(phase.as_bytes())))
}

/// Hash of a pixel coordinate under a seed.
pub fn hash_coords(seed: u64, x: i64, y: i64) -> u64 {
    let mut h = splitmix64(seed);
    h ^= (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h = splitmix64(h);
    h ^= (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    splitmix64(h)
}

/// Uniform value in [0, 1) that depends only on (seed, x, y).
pub fn hash01(seed: u64, x: i64, y: i64) -> f64 {
    (hash_coords(seed, x, y) >> 11) as f64 / (1u64 << 53) as f64
}
