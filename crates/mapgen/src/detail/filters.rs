use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layers::{TerrainRaster, VegetationRaster};
use crate::raster::Mask;
use crate::roads::{RoadLayer, RoadSurface};

/// Which road surface a detail pixel must sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadMode {
    #[default]
    Any,
    AsphaltOnly,
    DirtOnly,
    /// Only where no road is drawn.
    OffRoad,
}

/// Adjacency predicates of one detail job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailFilters {
    pub terrain_in: Option<Vec<String>>,
    pub vegetation_in: Option<Vec<String>>,
    /// With a non-zero radius, a vegetation match anywhere within it is enough.
    pub vegetation_radius: u32,
    pub road_mode: RoadMode,
    /// Pixel must lie within this many pixels of a road.
    pub road_proximity: Option<u32>,
}

/// Filters resolved against the rasters of one run.
pub(super) struct CompiledFilters<'a> {
    terrain: Option<(Vec<bool>, &'a TerrainRaster)>,
    vegetation: Option<Mask>,
    road_mode: RoadMode,
    roads: Option<&'a RoadLayer>,
    near_road: Option<Mask>,
}

impl DetailFilters {
    /// Absent vegetation or roads make their filters pass, except the surface
    /// modes that need a road to match.
    pub(super) fn compile<'a>(
        &self,
        terrain: &'a TerrainRaster,
        vegetation: Option<&VegetationRaster>,
        roads: Option<&'a RoadLayer>,
    ) -> Result<CompiledFilters<'a>, ConfigError> {
        let terrain_table = match &self.terrain_in {
            Some(names) => Some((terrain.legend.membership(names, "terrain")?, terrain)),
            None => None,
        };

        let vegetation = match (&self.vegetation_in, vegetation) {
            (Some(names), Some(veg)) => {
                let table = veg.legend.membership(names, "vegetation")?;
                let exact = Mask::from_fn(veg.width(), veg.height(), |x, y| {
                    table
                        .get(*veg.labels.get(x, y) as usize)
                        .copied()
                        .unwrap_or(false)
                });
                Some(if self.vegetation_radius > 0 {
                    exact.dilate(self.vegetation_radius)
                } else {
                    exact
                })
            }
            _ => None,
        };

        let near_road = match (self.road_proximity, roads) {
            (Some(radius), Some(layer)) => Some(layer.road_mask().dilate(radius)),
            _ => None,
        };

        Ok(CompiledFilters {
            terrain: terrain_table,
            vegetation,
            road_mode: self.road_mode,
            roads,
            near_road,
        })
    }
}

impl CompiledFilters<'_> {
    pub(super) fn passes(&self, x: u32, y: u32) -> bool {
        if let Some((table, terrain)) = &self.terrain {
            let id = *terrain.labels.get(x, y) as usize;
            if !table.get(id).copied().unwrap_or(false) {
                return false;
            }
        }
        if let Some(mask) = &self.vegetation
            && !mask.get_signed(x as i32, y as i32)
        {
            return false;
        }
        if let Some(mask) = &self.near_road
            && !mask.get_signed(x as i32, y as i32)
        {
            return false;
        }
        let surface = self
            .roads
            .filter(|r| r.surface.in_bounds(x as i32, y as i32))
            .map(|r| r.surface_at(x, y));
        match self.road_mode {
            RoadMode::Any => true,
            RoadMode::AsphaltOnly => surface == Some(Some(RoadSurface::Asphalt)),
            RoadMode::DirtOnly => surface == Some(Some(RoadSurface::Dirt)),
            RoadMode::OffRoad => !matches!(surface, Some(Some(_))),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::layers::{LabeledRaster, Legend, LegendEntry, Surface};
    use crate::palette::Color;
    use crate::raster::Grid;
    use crate::roads::{RoadClass, RoadClasses, RoadNetwork, rasterize};

    fn two_label(w: u32, h: u32, names: [&str; 2], split: u32) -> LabeledRaster {
        let mut legend = Legend::new();
        for (i, name) in names.iter().enumerate() {
            legend.push(LegendEntry {
                name: name.to_string(),
                color: Color::rgb(i as u8 * 100, 50, 50),
                surface: Surface::Ground,
                cost: 1,
            });
        }
        LabeledRaster::from_labels(Grid::from_fn(w, h, |x, _| u16::from(x >= split)), legend)
    }

    fn roads(w: u32, h: u32) -> RoadLayer {
        let mut net = RoadNetwork::new(w, h);
        net.add_polyline(RoadClass::Main, vec![Vec2::new(0.0, 10.0), Vec2::new(w as f32 - 1.0, 10.0)]);
        net.add_polyline(RoadClass::Side, vec![Vec2::new(5.0, 0.0), Vec2::new(5.0, 5.0)]);
        rasterize(&net, &RoadClasses::default(), Color::rgb(60, 60, 60))
    }

    #[test]
    fn test_terrain_membership() {
        let terrain = two_label(20, 20, ["grass", "sand"], 10);
        let filters = DetailFilters {
            terrain_in: Some(vec!["sand".into()]),
            ..Default::default()
        };
        let c = filters.compile(&terrain, None, None).unwrap();
        assert!(!c.passes(2, 2));
        assert!(c.passes(15, 2));
    }

    #[test]
    fn test_vegetation_radius_widens_match() {
        let terrain = two_label(20, 20, ["grass", "sand"], 10);
        let veg = two_label(20, 20, ["none", "shrub"], 12);
        let exact = DetailFilters {
            vegetation_in: Some(vec!["shrub".into()]),
            ..Default::default()
        };
        let near = DetailFilters {
            vegetation_radius: 3,
            ..exact.clone()
        };
        let exact = exact.compile(&terrain, Some(&veg), None).unwrap();
        let near = near.compile(&terrain, Some(&veg), None).unwrap();
        assert!(!exact.passes(10, 5));
        assert!(near.passes(10, 5));
        assert!(!near.passes(5, 5));
    }

    #[test]
    fn test_missing_optional_rasters() {
        let terrain = two_label(20, 20, ["grass", "sand"], 10);
        let lenient = DetailFilters {
            vegetation_in: Some(vec!["anything".into()]),
            road_proximity: Some(2),
            ..Default::default()
        };
        assert!(lenient.compile(&terrain, None, None).unwrap().passes(3, 3));

        let asphalt = DetailFilters {
            road_mode: RoadMode::AsphaltOnly,
            ..Default::default()
        };
        let c = asphalt.compile(&terrain, None, None).unwrap();
        assert!(!c.passes(3, 3));
        let off = DetailFilters {
            road_mode: RoadMode::OffRoad,
            ..Default::default()
        };
        assert!(off.compile(&terrain, None, None).unwrap().passes(3, 3));
    }

    #[test]
    fn test_road_modes() {
        let terrain = two_label(30, 30, ["grass", "sand"], 15);
        let layer = roads(30, 30);
        let mode = |road_mode| DetailFilters {
            road_mode,
            ..Default::default()
        };
        let asphalt = mode(RoadMode::AsphaltOnly).compile(&terrain, None, Some(&layer)).unwrap();
        let dirt = mode(RoadMode::DirtOnly).compile(&terrain, None, Some(&layer)).unwrap();
        let off = mode(RoadMode::OffRoad).compile(&terrain, None, Some(&layer)).unwrap();
        assert!(asphalt.passes(20, 10));
        assert!(!asphalt.passes(20, 20));
        assert!(dirt.passes(5, 2));
        assert!(!dirt.passes(20, 10));
        assert!(off.passes(20, 20));
        assert!(!off.passes(20, 10));
    }

    #[test]
    fn test_proximity() {
        let terrain = two_label(30, 30, ["grass", "sand"], 15);
        let layer = roads(30, 30);
        let c = DetailFilters {
            road_proximity: Some(3),
            ..Default::default()
        }
        .compile(&terrain, None, Some(&layer))
        .unwrap();
        assert!(c.passes(20, 13));
        assert!(!c.passes(20, 25));
    }

    #[test]
    fn test_unknown_vegetation_name_rejected() {
        let terrain = two_label(8, 8, ["grass", "sand"], 4);
        let veg = two_label(8, 8, ["none", "shrub"], 4);
        let filters = DetailFilters {
            vegetation_in: Some(vec!["cactus".into()]),
            ..Default::default()
        };
        assert!(filters.compile(&terrain, Some(&veg), None).is_err());
    }
}
