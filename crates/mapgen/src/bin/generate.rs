//! Generates a map and writes each layer as a PNG.
//!
//! Run with:
//! ```
//! MAPGEN_CONFIG=map.json MAPGEN_OUT=out cargo run -p mapgen --bin generate
//! ```
//!
//! `MAPGEN_CONFIG` points at a JSON `MapConfig` (defaults when unset),
//! `MAPGEN_RULE_COLORS` at an optional JSON object of job name to colour list.

use std::path::PathBuf;

use anyhow::Context;
use mapgen::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("MAPGEN_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<MapConfig>(&raw).with_context(|| format!("parsing {path}"))?
        }
        Err(_) => MapConfig::default().with_seed(12345),
    };
    let rule_colors = match std::env::var("MAPGEN_RULE_COLORS") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<RuleColors>(&raw).with_context(|| format!("parsing {path}"))?
        }
        Err(_) => RuleColors::new(),
    };
    let out = PathBuf::from(std::env::var("MAPGEN_OUT").unwrap_or_else(|_| "out".to_string()));
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    let map = MapGenerator::new(config)
        .with_rule_colors(rule_colors)
        .generate()?;

    map.terrain.image.save(out.join("terrain.png"))?;
    map.vegetation.image.save(out.join("vegetation.png"))?;
    map.roads_image().save(out.join("roads.png"))?;
    map.detail.save(out.join("detail.png"))?;
    map.composite().save(out.join("composite.png"))?;

    // Summary output
    tracing::info!("Map written to {}", out.display());
    tracing::info!("  Size: {}x{}", map.width(), map.height());
    tracing::info!("  Water pixels: {}", map.terrain.count_named("water"));
    tracing::info!("  Road polylines: {}", map.metrics.road_polylines);
    tracing::info!("  Road segments: {}", map.metrics.road_segments);
    tracing::info!("  Parking lots: {}", map.metrics.parking_lots);
    tracing::info!("  Detail pixels: {}", map.metrics.detail_pixels);

    Ok(())
}
