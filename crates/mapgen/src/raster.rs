//! Grids, bit masks, and pixel drawing primitives shared by every stage.

use bitvec::prelude::*;
use image::RgbaImage;

/// Dense row-major 2D grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, T::default())
    }
}

impl<T: Clone> Grid<T> {
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }
}

impl<T> Grid<T> {
    /// Wraps row-major data. Returns `None` if the length does not match.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> &T {
        &self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: u32, y: u32) -> &mut T {
        let i = self.idx(x, y);
        &mut self.data[i]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, v: T) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// Signed lookup; `None` outside the grid.
    #[inline]
    pub fn get_signed(&self, x: i32, y: i32) -> Option<&T> {
        self.in_bounds(x, y).then(|| self.get(x as u32, y as u32))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Iterates `(x, y, value)` in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (u32, u32, &T)> {
        let w = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| ((i as u32) % w, (i as u32) / w, v))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }
}

/// Offsets of the four edge-adjacent neighbours.
pub const NEIGHBORS_4: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Offsets of all eight neighbours.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Packed boolean raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: BitVec,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: bitvec![0; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set(&mut self, x: u32, y: u32, v: bool) {
        let i = self.idx(x, y);
        self.bits.set(i, v);
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.idx(x, y)]
    }

    /// Signed lookup; outside the mask reads as `false`.
    pub fn get_signed(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && (x as u32) < self.width
            && (y as u32) < self.height
            && self.get(x as u32, y as u32)
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn iter_true(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = self.width.max(1);
        self.bits
            .iter_ones()
            .map(move |i| ((i as u32) % w, (i as u32) / w))
    }

    /// Every pixel within Euclidean distance `radius` of a set pixel.
    pub fn dilate(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }
        let r = radius as i32;
        let mut out = self.clone();
        for (x, y) in self.iter_true() {
            let (x, y) = (x as i32, y as i32);
            let interior = NEIGHBORS_4
                .iter()
                .all(|(dx, dy)| self.get_signed(x + dx, y + dy));
            if interior {
                continue;
            }
            for (px, py) in disk_points(x, y, r) {
                if px >= 0 && py >= 0 && (px as u32) < self.width && (py as u32) < self.height {
                    out.set(px as u32, py as u32, true);
                }
            }
        }
        out
    }
}

/// Integer points of the disk of radius `r` centred on (cx, cy).
pub fn disk_points(cx: i32, cy: i32, r: i32) -> impl Iterator<Item = (i32, i32)> {
    let r = r.max(0);
    (-r..=r).flat_map(move |dy| {
        (-r..=r)
            .filter(move |dx| dx * dx + dy * dy <= r * r)
            .map(move |dx| (cx + dx, cy + dy))
    })
}

/// Bresenham line from `a` to `b`, both endpoints included.
pub fn line_points(a: (i32, i32), b: (i32, i32)) -> Vec<(i32, i32)> {
    let (mut x0, mut y0) = a;
    let (x1, y1) = b;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut out = Vec::with_capacity((dx.max(-dy) + 1) as usize);

    loop {
        out.push((x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    out
}

/// Mask of every non-transparent pixel of an image.
pub fn opaque_mask(img: &RgbaImage) -> Mask {
    Mask::from_fn(img.width(), img.height(), |x, y| img.get_pixel(x, y).0[3] != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_roundtrip_index() {
        let g = Grid::from_fn(4, 3, |x, y| x + 10 * y);
        assert_eq!(*g.get(3, 2), 23);
        assert_eq!(g.get_signed(-1, 0), None);
        assert_eq!(g.get_signed(4, 0), None);
        let coords: Vec<_> = g.enumerate().map(|(x, y, _)| (x, y)).take(5).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (2, 0), (3, 0), (0, 1)]);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Grid::from_vec(2, 2, vec![0u8; 3]).is_none());
        assert!(Grid::from_vec(2, 2, vec![0u8; 4]).is_some());
    }

    #[test]
    fn test_line_endpoints() {
        let pts = line_points((0, 0), (5, 2));
        assert_eq!(pts.first(), Some(&(0, 0)));
        assert_eq!(pts.last(), Some(&(5, 2)));
        assert_eq!(pts.len(), 6);
    }

    #[test]
    fn test_mask_dilate() {
        let mut m = Mask::new(11, 11);
        m.set(5, 5, true);
        let d = m.dilate(2);
        assert!(d.get(5, 7));
        assert!(d.get(7, 5));
        assert!(!d.get(7, 7));
        assert_eq!(d.count(), 13);
    }

    #[test]
    fn test_opaque_mask() {
        let mut img = RgbaImage::new(4, 1);
        img.put_pixel(1, 0, image::Rgba([0, 0, 0, 9]));
        let m = opaque_mask(&img);
        assert_eq!(m.iter_true().collect::<Vec<_>>(), vec![(1, 0)]);
    }
}
