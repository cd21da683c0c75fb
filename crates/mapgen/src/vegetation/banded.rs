use serde::{Deserialize, Serialize};

use super::NONE;
use crate::error::ConfigError;
use crate::layers::{LayerPass, Legend, LegendEntry, Surface};
use crate::noise::{NoiseSampler, NoiseSpec, compute_field};
use crate::palette::Palette;
use crate::raster::Grid;
use crate::terrain::Normalization;

/// One global field bucketed into the palette's density scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandedVegetation {
    pub noise: NoiseSpec,
    /// Ascending lower bounds of each density level; one per palette entry.
    pub bands: Vec<f32>,
    /// Exponent applied to the biased value; above 1 makes dense bands rarer.
    pub skew: f32,
    pub normalization: Normalization,
}

impl Default for BandedVegetation {
    fn default() -> Self {
        Self {
            noise: NoiseSpec::new(60.0).with_octaves(4),
            bands: vec![0.35, 0.5, 0.62, 0.72, 0.8],
            skew: 1.2,
            normalization: Normalization::default(),
        }
    }
}

impl BandedVegetation {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.noise.validate("vegetation.noise")?;
        if self.bands.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::UnorderedThresholds("vegetation".into()));
        }
        if !(self.skew > 0.0) {
            return Err(ConfigError::invalid("vegetation.skew", "must be positive"));
        }
        Ok(())
    }

    /// Density level for a normalized, biased value: 0 is none.
    pub fn level(&self, v: f32) -> usize {
        let v = v.clamp(0.0, 1.0).powf(self.skew);
        self.bands.iter().take_while(|&&b| v >= b).count()
    }

    pub(super) fn paint(
        &self,
        pass: &LayerPass<'_>,
        palette: &Palette,
        bias: &[f32],
        legend: &mut Legend,
    ) -> Result<Grid<u16>, ConfigError> {
        if self.bands.len() != palette.vegetation.len() {
            return Err(ConfigError::invalid(
                "vegetation.bands",
                format!(
                    "{} bands for {} palette levels",
                    self.bands.len(),
                    palette.vegetation.len()
                ),
            ));
        }
        let Some(terrain) = pass.terrain else {
            return Err(ConfigError::invalid("vegetation", "terrain raster required"));
        };

        let first = legend.len() as u16;
        for (level, named) in palette.vegetation.iter().enumerate() {
            legend.push(LegendEntry {
                name: named.name.clone(),
                color: named.color,
                surface: Surface::Ground,
                cost: level as u32 + 1,
            });
        }

        let seed = self
            .noise
            .resolve_seed(pass.master_seed, &format!("{}.banded", pass.seed_scope));
        let sampler = NoiseSampler::new(&self.noise, seed);
        let field = self
            .normalization
            .apply(&compute_field(pass.cell, &sampler, pass.transform, pass.workers));

        Ok(Grid::from_fn(field.width(), field.height(), |x, y| {
            let t = *terrain.labels.get(x, y) as usize;
            let v = field.get(x, y) + bias.get(t).copied().unwrap_or(0.0);
            match self.level(v) {
                0 => NONE,
                level => first + level as u16 - 1,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_buckets() {
        let banded = BandedVegetation {
            skew: 1.0,
            ..Default::default()
        };
        assert_eq!(banded.level(0.1), 0);
        assert_eq!(banded.level(0.35), 1);
        assert_eq!(banded.level(0.55), 2);
        assert_eq!(banded.level(0.99), 5);
    }

    #[test]
    fn test_skew_makes_dense_rarer() {
        let flat = BandedVegetation {
            skew: 1.0,
            ..Default::default()
        };
        let skewed = BandedVegetation {
            skew: 2.0,
            ..Default::default()
        };
        let dense = |b: &BandedVegetation| (0..=1000).filter(|i| b.level(*i as f32 / 1000.0) >= 4).count();
        assert!(dense(&skewed) < dense(&flat));
    }

    #[test]
    fn test_bias_clamps() {
        let banded = BandedVegetation::default();
        assert_eq!(banded.level(5.0), 5);
        assert_eq!(banded.level(-3.0), 0);
    }
}
