use image::RgbaImage;

use super::cost::to_pixel;
use super::{RoadClass, RoadClasses, RoadNetwork, RoadSurface};
use crate::palette::Color;
use crate::raster::{Grid, Mask, disk_points, line_points};

/// Rendered roads: colour image, per-pixel surface, and the pothole overlay
/// kept separate until composition.
#[derive(Debug, Clone)]
pub struct RoadLayer {
    pub image: RgbaImage,
    pub surface: Grid<Option<RoadSurface>>,
    pub potholes: RgbaImage,
}

impl RoadLayer {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            surface: Grid::new(width, height),
            potholes: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn surface_at(&self, x: u32, y: u32) -> Option<RoadSurface> {
        *self.surface.get(x, y)
    }

    pub fn mask_where(&self, pred: impl Fn(RoadSurface) -> bool) -> Mask {
        Mask::from_fn(self.width(), self.height(), |x, y| {
            self.surface_at(x, y).is_some_and(&pred)
        })
    }

    /// Pixels covered by any road or lot.
    pub fn road_mask(&self) -> Mask {
        self.mask_where(|_| true)
    }

    pub fn asphalt_mask(&self) -> Mask {
        self.mask_where(|s| s == RoadSurface::Asphalt)
    }

    /// Road image with potholes drawn on top.
    pub fn flattened(&self) -> RgbaImage {
        let mut out = self.image.clone();
        image::imageops::overlay(&mut out, &self.potholes, 0, 0);
        out
    }

    fn paint(&mut self, x: i32, y: i32, color: Color, surface: RoadSurface) {
        if self.surface.in_bounds(x, y) {
            let (x, y) = (x as u32, y as u32);
            self.image.put_pixel(x, y, color.to_rgba());
            self.surface.set(x, y, Some(surface));
        }
    }
}

/// Draws lots first, then every class from lowest to highest priority so
/// higher classes win on overlap.
pub fn rasterize(network: &RoadNetwork, classes: &RoadClasses, lot_color: Color) -> RoadLayer {
    let mut layer = RoadLayer::empty(network.width, network.height);

    for lot in &network.lots {
        for y in lot.y..lot.y + lot.height as i32 {
            for x in lot.x..lot.x + lot.width as i32 {
                layer.paint(x, y, lot_color, RoadSurface::Asphalt);
            }
        }
    }

    for class in RoadClass::BY_PRIORITY {
        let style = classes.get(class);
        let radius = (style.width / 2) as i32;
        for poly in network.of_class(class) {
            for (a, b) in poly.segments() {
                for (px, py) in line_points(to_pixel(a), to_pixel(b)) {
                    for (x, y) in disk_points(px, py, radius) {
                        layer.paint(x, y, style.color, style.surface);
                    }
                }
            }
        }
    }
    layer
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::roads::ParkingLot;

    fn crossing() -> RoadNetwork {
        let mut net = RoadNetwork::new(40, 40);
        net.add_polyline(RoadClass::Side, vec![Vec2::new(20.0, 0.0), Vec2::new(20.0, 39.0)]);
        net.add_polyline(RoadClass::Highway, vec![Vec2::new(0.0, 20.0), Vec2::new(39.0, 20.0)]);
        net
    }

    #[test]
    fn test_higher_class_wins_overlap() {
        let classes = RoadClasses::default();
        let layer = rasterize(&crossing(), &classes, Color::rgb(90, 90, 90));
        assert_eq!(
            layer.image.get_pixel(20, 20).0,
            classes.highway.color.to_rgba().0
        );
        assert_eq!(layer.surface_at(20, 20), Some(RoadSurface::Asphalt));
        assert_eq!(layer.image.get_pixel(20, 5).0, classes.side.color.to_rgba().0);
        assert_eq!(layer.surface_at(20, 5), Some(RoadSurface::Dirt));
        assert_eq!(layer.surface_at(5, 5), None);
    }

    #[test]
    fn test_width_controls_stroke() {
        let classes = RoadClasses::default();
        let layer = rasterize(&crossing(), &classes, Color::rgb(90, 90, 90));
        let r = classes.highway.width / 2;
        assert!(layer.surface_at(5, 20 + r).is_some());
        assert!(layer.surface_at(5, 20 + r + 1).is_none());
    }

    #[test]
    fn test_lots_are_asphalt_under_roads() {
        let mut net = RoadNetwork::new(30, 30);
        net.lots.push(ParkingLot {
            x: 2,
            y: 2,
            width: 6,
            height: 4,
        });
        let lot_color = Color::rgb(70, 70, 75);
        let layer = rasterize(&net, &RoadClasses::default(), lot_color);
        assert_eq!(layer.image.get_pixel(3, 3).0, lot_color.to_rgba().0);
        assert_eq!(layer.surface_at(7, 5), Some(RoadSurface::Asphalt));
        assert_eq!(layer.surface_at(8, 5), None);
        assert_eq!(layer.asphalt_mask().count(), 24);
    }
}
