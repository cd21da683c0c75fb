//! Detail overlay: small decorative pixel clusters scattered by rule.
//!
//! Each job picks anchors either by scanning a noise field at a stride or by
//! sampling random points, checks its filters at the anchor, and grows a small
//! jittered cluster whose pixels are checked again one by one. Jobs paint in
//! declared order, so a later job wins where two overlap.

mod filters;

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use image::RgbaImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use filters::{DetailFilters, RoadMode};

use crate::config::Cell;
use crate::error::{ConfigError, GenError};
use crate::layers::{TerrainRaster, VegetationRaster};
use crate::noise::{NoiseSampler, NoiseSpec, compute_field, phase_rng};
use crate::palette::{Color, Palette};
use crate::roads::RoadLayer;
use crate::terrain::Normalization;

use filters::CompiledFilters;

/// Job name -> colours, loaded by the caller from outside the configuration.
pub type RuleColors = BTreeMap<String, Vec<Color>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sampling", rename_all = "snake_case")]
pub enum DetailSampling {
    /// Visit every `stride`-th pixel of a noise field.
    GridScan {
        #[serde(default)]
        noise: NoiseSpec,
        stride: u32,
        #[serde(default)]
        normalization: Normalization,
    },
    /// Draw `count` random anchors, each retried up to `attempts` times.
    Points { count: usize, attempts: usize },
}

impl Default for DetailSampling {
    fn default() -> Self {
        Self::GridScan {
            noise: NoiseSpec::new(24.0).with_octaves(2),
            stride: 6,
            normalization: Normalization::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSpec {
    /// Pixels per cluster, inclusive range.
    pub size: [usize; 2],
    /// Cluster pixels fall within this distance of the anchor.
    pub radius: f32,
    /// Grid-scan anchors move up to `jitter * stride / 2` pixels off the grid.
    pub jitter: f32,
}

impl Default for ClusterSpec {
    fn default() -> Self {
        Self {
            size: [1, 4],
            radius: 2.0,
            jitter: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailJob {
    pub name: String,
    pub enabled: bool,
    /// Explicit colours; empty means look the job name up in the rule colours.
    pub colors: Vec<Color>,
    /// 0..=1, scaled by the global density.
    pub density: f32,
    pub sampling: DetailSampling,
    pub filters: DetailFilters,
    pub cluster: ClusterSpec,
}

impl Default for DetailJob {
    fn default() -> Self {
        Self {
            name: "detail".into(),
            enabled: true,
            colors: Vec::new(),
            density: 0.3,
            sampling: DetailSampling::default(),
            filters: DetailFilters::default(),
            cluster: ClusterSpec::default(),
        }
    }
}

impl DetailJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_colors(mut self, colors: Vec<Color>) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_sampling(mut self, sampling: DetailSampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_filters(mut self, filters: DetailFilters) -> Self {
        self.filters = filters;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let field = |f: &str| format!("detail.jobs.{}.{f}", self.name);
        if !(0.0..=1.0).contains(&self.density) {
            return Err(ConfigError::invalid(field("density"), "must be within 0..=1"));
        }
        let [lo, hi] = self.cluster.size;
        if lo == 0 || lo > hi {
            return Err(ConfigError::invalid(
                field("cluster.size"),
                "must be an ascending range starting at 1 or more",
            ));
        }
        if self.cluster.radius < 0.0 || self.cluster.jitter < 0.0 {
            return Err(ConfigError::invalid(field("cluster"), "must not be negative"));
        }
        match &self.sampling {
            DetailSampling::GridScan { noise, stride, .. } => {
                noise.validate(&field("noise"))?;
                if *stride == 0 {
                    return Err(ConfigError::invalid(field("stride"), "must be at least 1"));
                }
            }
            DetailSampling::Points { attempts, .. } => {
                if *attempts == 0 {
                    return Err(ConfigError::invalid(field("attempts"), "must be at least 1"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Multiplies every job's density and point count.
    pub global_density: f32,
    pub jobs: Vec<DetailJob>,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            global_density: 1.0,
            jobs: Vec::new(),
        }
    }
}

impl DetailConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.global_density < 0.0 {
            return Err(ConfigError::invalid("detail.global_density", "must not be negative"));
        }
        self.jobs.iter().try_for_each(DetailJob::validate)
    }
}

pub struct DetailGenerator<'a> {
    config: &'a DetailConfig,
    palette: &'a Palette,
    rule_colors: &'a RuleColors,
    master_seed: u64,
    workers: usize,
}

impl<'a> DetailGenerator<'a> {
    pub fn new(
        config: &'a DetailConfig,
        palette: &'a Palette,
        rule_colors: &'a RuleColors,
        master_seed: u64,
    ) -> Self {
        Self {
            config,
            palette,
            rule_colors,
            master_seed,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Terrain is required for sizing; vegetation and roads are optional.
    pub fn generate(
        &self,
        cell: &Cell,
        terrain: Option<&TerrainRaster>,
        vegetation: Option<&VegetationRaster>,
        roads: Option<&RoadLayer>,
    ) -> Result<RgbaImage, GenError> {
        let terrain = terrain.ok_or(GenError::MissingPrerequisite("terrain raster"))?;
        if terrain.width() != cell.width || terrain.height() != cell.height {
            return Err(ConfigError::invalid("detail", "terrain raster does not match the cell size").into());
        }
        let mut image = RgbaImage::new(terrain.width(), terrain.height());

        for job in self.config.jobs.iter().filter(|j| j.enabled) {
            let filters = job.filters.compile(terrain, vegetation, roads)?;
            let colors = self.colors_for(job);
            let mut rng = phase_rng(self.master_seed, &format!("detail.{}", job.name));
            let mut painter = Painter {
                image: &mut image,
                filters: &filters,
                colors: &colors,
                cluster: &job.cluster,
                painted: 0,
            };
            let clusters = match &job.sampling {
                DetailSampling::GridScan {
                    noise,
                    stride,
                    normalization,
                } => {
                    let seed = noise.resolve_seed(self.master_seed, &format!("detail.{}", job.name));
                    let field = normalization.apply(&compute_field(
                        cell,
                        &NoiseSampler::new(noise, seed),
                        None,
                        self.workers,
                    ));
                    let threshold = 1.0 - job.density * self.config.global_density;
                    let step = *stride as usize;
                    let reach = (job.cluster.jitter * *stride as f32 / 2.0).round() as i32;
                    let mut clusters = 0usize;
                    for y in (0..field.height()).step_by(step) {
                        for x in (0..field.width()).step_by(step) {
                            if *field.get(x, y) <= threshold {
                                continue;
                            }
                            let ax = (x as i32 + rng.gen_range(-reach..=reach))
                                .clamp(0, field.width() as i32 - 1);
                            let ay = (y as i32 + rng.gen_range(-reach..=reach))
                                .clamp(0, field.height() as i32 - 1);
                            if filters.passes(ax as u32, ay as u32) {
                                painter.cluster(ax, ay, &mut rng);
                                clusters += 1;
                            }
                        }
                    }
                    clusters
                }
                DetailSampling::Points { count, attempts } => {
                    let target = (*count as f32 * self.config.global_density).round() as usize;
                    let (w, h) = (terrain.width(), terrain.height());
                    let mut clusters = 0usize;
                    for _ in 0..target {
                        let anchor = (0..*attempts).find_map(|_| {
                            let (x, y) = (rng.gen_range(0..w), rng.gen_range(0..h));
                            filters.passes(x, y).then_some((x as i32, y as i32))
                        });
                        match anchor {
                            Some((x, y)) => {
                                painter.cluster(x, y, &mut rng);
                                clusters += 1;
                            }
                            None => debug!(job = %job.name, "detail point skipped"),
                        }
                    }
                    clusters
                }
            };
            info!(job = %job.name, clusters, pixels = painter.painted, "detail job painted");
        }
        Ok(image)
    }

    fn colors_for(&self, job: &DetailJob) -> Vec<Color> {
        if !job.colors.is_empty() {
            return job.colors.clone();
        }
        match self.rule_colors.get(&job.name) {
            Some(colors) if !colors.is_empty() => colors.clone(),
            _ => {
                debug!(job = %job.name, "no rule colour, using fallback");
                vec![self.palette.detail_fallback]
            }
        }
    }
}

struct Painter<'a, 'f> {
    image: &'a mut RgbaImage,
    filters: &'a CompiledFilters<'f>,
    colors: &'a [Color],
    cluster: &'a ClusterSpec,
    painted: usize,
}

impl Painter<'_, '_> {
    /// First pixel sits on the anchor; the rest scatter uniformly in the disk.
    fn cluster(&mut self, ax: i32, ay: i32, rng: &mut ChaCha8Rng) {
        let n = rng.gen_range(self.cluster.size[0]..=self.cluster.size[1]);
        let (w, h) = (self.image.width() as i32, self.image.height() as i32);
        for i in 0..n {
            let (x, y) = if i == 0 {
                (ax, ay)
            } else {
                let angle = rng.gen_range(0.0..TAU);
                let r = self.cluster.radius * rng.r#gen::<f32>().sqrt();
                (
                    ax + (r * angle.cos()).round() as i32,
                    ay + (r * angle.sin()).round() as i32,
                )
            };
            let color = self.colors[rng.gen_range(0..self.colors.len())];
            if x < 0 || y < 0 || x >= w || y >= h || !self.filters.passes(x as u32, y as u32) {
                continue;
            }
            self.image.put_pixel(x as u32, y as u32, color.to_rgba());
            self.painted += 1;
        }
    }
}
