//! Labeled rasters and ordered feature layers shared by terrain and vegetation.
//!
//! Stages work on per-pixel label ids; the RGBA image is rendered from the legend.
//! Downstream stages ask "is this water?" of the legend instead of comparing colors.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::config::Cell;
use crate::error::ConfigError;
use crate::noise::{NoiseSampler, NoiseSpec, SampleTransform, compute_field, normalize_min_max};
use crate::palette::Color;
use crate::raster::Grid;

/// Physical surface a terrain label represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    #[default]
    Ground,
    Water,
    Paved,
}

/// One legend entry. Several entries may share a name (palette layers).
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub name: String,
    pub color: Color,
    pub surface: Surface,
    /// Road traversal cost contribution.
    pub cost: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Legend {
    entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LegendEntry) -> u16 {
        self.entries.push(entry);
        (self.entries.len() - 1) as u16
    }

    pub fn get(&self, id: u16) -> Option<&LegendEntry> {
        self.entries.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Lookup table indexed by label id: `true` where the entry's name is in `names`.
    pub fn membership(&self, names: &[String], kind: &'static str) -> Result<Vec<bool>, ConfigError> {
        if let Some(unknown) = names.iter().find(|n| !self.contains_name(n)) {
            return Err(ConfigError::UnknownName {
                kind,
                name: unknown.clone(),
            });
        }
        Ok(self
            .entries
            .iter()
            .map(|e| names.iter().any(|n| *n == e.name))
            .collect())
    }

    /// Lookup table indexed by label id: `true` where `pred` holds.
    pub fn table(&self, pred: impl Fn(&LegendEntry) -> bool) -> Vec<bool> {
        self.entries.iter().map(pred).collect()
    }
}

/// A raster of labels plus its rendered RGBA image.
#[derive(Debug, Clone)]
pub struct LabeledRaster {
    pub image: RgbaImage,
    pub labels: Grid<u16>,
    pub legend: Legend,
}

/// Terrain output.
pub type TerrainRaster = LabeledRaster;
/// Vegetation output; label 0 is always "none".
pub type VegetationRaster = LabeledRaster;

impl LabeledRaster {
    pub fn from_labels(labels: Grid<u16>, legend: Legend) -> Self {
        let image = render(&labels, &legend);
        Self {
            image,
            labels,
            legend,
        }
    }

    pub fn width(&self) -> u32 {
        self.labels.width()
    }

    pub fn height(&self) -> u32 {
        self.labels.height()
    }

    pub fn entry_at(&self, x: u32, y: u32) -> Option<&LegendEntry> {
        self.legend.get(*self.labels.get(x, y))
    }

    pub fn name_at(&self, x: u32, y: u32) -> Option<&str> {
        self.entry_at(x, y).map(|e| e.name.as_str())
    }

    pub fn surface_at(&self, x: u32, y: u32) -> Surface {
        self.entry_at(x, y).map(|e| e.surface).unwrap_or_default()
    }

    /// Sets one pixel's label and repaints it.
    pub fn set_label(&mut self, x: u32, y: u32, id: u16) {
        self.labels.set(x, y, id);
        let color = self.legend.get(id).map(|e| e.color).unwrap_or(Color::TRANSPARENT);
        self.image.put_pixel(x, y, color.to_rgba());
    }

    /// Number of pixels carrying a label with this name.
    pub fn count_named(&self, name: &str) -> usize {
        let table = self.legend.table(|e| e.name == name);
        self.labels
            .iter()
            .filter(|&&id| table.get(id as usize).copied().unwrap_or(false))
            .count()
    }
}

/// Renders labels through the legend; unknown ids are transparent.
pub fn render(labels: &Grid<u16>, legend: &Legend) -> RgbaImage {
    let mut img = RgbaImage::new(labels.width(), labels.height());
    for (x, y, &id) in labels.enumerate() {
        let color = legend.get(id).map(|e| e.color).unwrap_or(Color::TRANSPARENT);
        img.put_pixel(x, y, color.to_rgba());
    }
    img
}

/// How a feature layer is colored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPaint {
    /// One flat color.
    Flat(Color),
    /// Ordered colors spread over the value range above the threshold.
    Palette(Vec<Color>),
}

impl Default for LayerPaint {
    fn default() -> Self {
        Self::Flat(Color::TRANSPARENT)
    }
}

/// A named noise-driven layer painted over everything declared before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureLayer {
    pub name: String,
    pub paint: LayerPaint,
    /// Normalized value (0..1) the field must exceed for the layer to paint.
    pub threshold: f32,
    pub noise: NoiseSpec,
    /// Only paint over these terrain names.
    pub terrain_in: Option<Vec<String>>,
    /// Only paint over these vegetation names. Ignored while painting terrain.
    pub vegetation_in: Option<Vec<String>>,
    pub surface: Surface,
    pub cost: u32,
}

impl Default for FeatureLayer {
    fn default() -> Self {
        Self {
            name: String::new(),
            paint: LayerPaint::default(),
            threshold: 0.5,
            noise: NoiseSpec::default(),
            terrain_in: None,
            vegetation_in: None,
            surface: Surface::Ground,
            cost: 1,
        }
    }
}

impl FeatureLayer {
    pub fn flat(name: impl Into<String>, color: Color, threshold: f32, noise: NoiseSpec) -> Self {
        Self {
            name: name.into(),
            paint: LayerPaint::Flat(color),
            threshold,
            noise,
            ..Default::default()
        }
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_terrain_in(mut self, names: &[&str]) -> Self {
        self.terrain_in = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_vegetation_in(mut self, names: &[&str]) -> Self {
        self.vegetation_in = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid(format!("{field}.name"), "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::invalid(
                format!("{field}.{}.threshold", self.name),
                "must be within 0..=1",
            ));
        }
        if let LayerPaint::Palette(colors) = &self.paint
            && colors.is_empty()
        {
            return Err(ConfigError::invalid(
                format!("{field}.{}.paint", self.name),
                "palette must not be empty",
            ));
        }
        self.noise.validate(&format!("{field}.{}.noise", self.name))
    }

    fn colors(&self) -> Vec<Color> {
        match &self.paint {
            LayerPaint::Flat(c) => vec![*c],
            LayerPaint::Palette(colors) => colors.clone(),
        }
    }
}

/// Inputs shared by every layer of one painting pass.
pub(crate) struct LayerPass<'a> {
    pub cell: &'a Cell,
    pub master_seed: u64,
    /// Prefix for derived seeds, e.g. `"terrain"`.
    pub seed_scope: &'a str,
    pub workers: usize,
    pub transform: Option<&'a SampleTransform>,
    /// Finished terrain when painting vegetation; `None` while painting terrain.
    pub terrain: Option<&'a TerrainRaster>,
}

/// Paints `layers` in declared order onto `labels`; later layers overwrite earlier ones.
pub(crate) fn paint_layers(
    pass: &LayerPass<'_>,
    layers: &[FeatureLayer],
    labels: &mut Grid<u16>,
    legend: &mut Legend,
) -> Result<(), ConfigError> {
    // Synthesizers may be driven without `MapConfig::validate`.
    let field = format!("{}.layers", pass.seed_scope);
    layers.iter().try_for_each(|l| l.validate(&field))?;

    // Register every layer first so filters may name any of them.
    let first_ids: Vec<(u16, usize)> = layers
        .iter()
        .map(|layer| {
            let colors = layer.colors();
            let first = legend.len() as u16;
            for color in &colors {
                legend.push(LegendEntry {
                    name: layer.name.clone(),
                    color: *color,
                    surface: layer.surface,
                    cost: layer.cost,
                });
            }
            (first, colors.len())
        })
        .collect();

    for (layer, &(first_id, shades)) in layers.iter().zip(&first_ids) {
        let (terrain_filter, own_filter) = match pass.terrain {
            // Painting vegetation: terrain filter reads the terrain raster,
            // vegetation filter reads what is painted so far.
            Some(terrain) => (
                resolve(layer.terrain_in.as_deref(), &terrain.legend, "terrain")?,
                resolve(layer.vegetation_in.as_deref(), legend, "vegetation")?,
            ),
            None => (None, resolve(layer.terrain_in.as_deref(), legend, "terrain")?),
        };

        let seed = layer
            .noise
            .resolve_seed(pass.master_seed, &format!("{}.{}", pass.seed_scope, layer.name));
        let sampler = NoiseSampler::new(&layer.noise, seed);
        let field = normalize_min_max(&compute_field(
            pass.cell,
            &sampler,
            pass.transform,
            pass.workers,
        ));

        let span = (1.0 - layer.threshold).max(f32::EPSILON);
        let mut painted = 0usize;
        for (x, y, &v) in field.enumerate() {
            if v <= layer.threshold {
                continue;
            }
            if let (Some(table), Some(terrain)) = (&terrain_filter, pass.terrain)
                && !lookup(table, *terrain.labels.get(x, y))
            {
                continue;
            }
            if let Some(table) = &own_filter
                && !lookup(table, *labels.get(x, y))
            {
                continue;
            }
            let shade = (((v - layer.threshold) / span) * shades as f32) as usize;
            labels.set(x, y, first_id + shade.min(shades - 1) as u16);
            painted += 1;
        }
        tracing::debug!(layer = %layer.name, painted, "painted feature layer");
    }
    Ok(())
}

fn resolve(
    names: Option<&[String]>,
    legend: &Legend,
    kind: &'static str,
) -> Result<Option<Vec<bool>>, ConfigError> {
    names.map(|n| legend.membership(n, kind)).transpose()
}

#[inline]
pub(crate) fn lookup(table: &[bool], id: u16) -> bool {
    table.get(id as usize).copied().unwrap_or(false)
}
