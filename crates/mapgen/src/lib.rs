//! Procedural, tileable 2D map generation.
//!
//! This crate paints a game-world map as four aligned RGBA layers: terrain biomes,
//! vegetation density, a hierarchical road network, and scattered ground detail.
//! Output for a given seed and configuration is bit-identical across runs and
//! worker counts.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mapgen::prelude::*;
//!
//! let config = MapConfig::default()
//!     .with_canvas(Canvas::single(512, 512))
//!     .with_seed(12345);
//! let map = MapGenerator::new(config).generate()?;
//! map.composite().save("map.png")?;
//! ```
//!
//! Each stage can also run on its own: [`terrain::TerrainSynthesizer`],
//! [`vegetation::VegetationSynthesizer`], [`roads::RoadPlanner`] with
//! [`roads::rasterize`] and [`roads::post::RoadPostProcessor`], and
//! [`detail::DetailGenerator`].

pub mod config;
pub mod detail;
pub mod error;
pub mod layers;
pub mod noise;
pub mod palette;
pub mod parallel;
pub mod pipeline;
pub mod raster;
pub mod roads;
pub mod terrain;
pub mod vegetation;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{Canvas, Cell, MapConfig};
    pub use crate::detail::{
        DetailConfig, DetailFilters, DetailGenerator, DetailJob, DetailSampling, RoadMode,
        RuleColors,
    };
    pub use crate::error::{ConfigError, GenError};
    pub use crate::layers::{FeatureLayer, LabeledRaster, Surface, TerrainRaster, VegetationRaster};
    pub use crate::noise::{NoiseSampler, NoiseSpec, SampleTransform, derive_seed};
    pub use crate::palette::{Color, Palette};
    pub use crate::pipeline::{GeneratedMap, MapGenerator};
    pub use crate::roads::post::{RoadPostConfig, RoadPostProcessor};
    pub use crate::roads::{
        AngleMode, PathfindConfig, RoadAlgorithm, RoadClass, RoadConfig, RoadLayer, RoadNetwork,
        RoadPlanner, RoadSurface, WalkConfig, rasterize,
    };
    pub use crate::terrain::{Normalization, TerrainConfig, TerrainMode, TerrainSynthesizer};
    pub use crate::vegetation::{VegetationConfig, VegetationMode, VegetationSynthesizer};
}
