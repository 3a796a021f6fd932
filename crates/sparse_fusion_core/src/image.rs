use crate::{Point3f, PointN};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// An 8-bit per channel color.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Pod, Serialize, Zeroable,
)]
#[repr(C)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Self = Rgb([0; 3]);

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb([r, g, b])
    }

    pub fn to_f32(self) -> Point3f {
        PointN([self.0[0] as f32, self.0[1] as f32, self.0[2] as f32])
    }

    /// Rounds and saturates each channel.
    pub fn from_f32(c: Point3f) -> Self {
        let channel = |v: f32| v.round().max(0.0).min(255.0) as u8;

        Rgb([channel(c.x()), channel(c.y()), channel(c.z())])
    }
}

/// A dense, row-major 2D grid of pixels.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Image<T> {
    width: usize,
    height: usize,
    pixels: Vec<T>,
}

/// Depth in meters along the optical axis. Zero, negative and non-finite values are holes.
pub type DepthImage = Image<f32>;
/// A color image co-registered with a `DepthImage`.
pub type ColorImage = Image<Rgb>;

impl<T> Image<T>
where
    T: Clone,
{
    pub fn fill(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }
}

impl<T> Image<T> {
    /// Returns `None` if `pixels` does not have exactly `width * height` elements.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<T>) -> Option<Self> {
        if pixels.len() != width * height {
            return None;
        }

        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn fill_with(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x < self.width && y < self.height {
            self.pixels.get(y * self.width + x)
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x < self.width && y < self.height {
            self.pixels.get_mut(y * self.width + x)
        } else {
            None
        }
    }

    pub fn into_pixels(self) -> Vec<T> {
        self.pixels
    }
}

impl DepthImage {
    /// The depth at `(x, y)`, or `None` for holes and out-of-bounds pixels.
    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> Option<f32> {
        self.get(x, y)
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn holes_have_no_depth() {
        let depth = DepthImage::fill_with(3, 2, |x, _y| match x {
            0 => 0.0,
            1 => std::f32::NAN,
            _ => 1.5,
        });

        assert_eq!(depth.depth_at(0, 0), None);
        assert_eq!(depth.depth_at(1, 1), None);
        assert_eq!(depth.depth_at(2, 1), Some(1.5));
        assert_eq!(depth.depth_at(3, 0), None);
    }

    #[test]
    fn from_pixels_checks_length() {
        assert!(ColorImage::from_pixels(2, 2, vec![Rgb::BLACK; 3]).is_none());
        assert!(ColorImage::from_pixels(2, 2, vec![Rgb::BLACK; 4]).is_some());
    }

    #[test]
    fn color_conversion_saturates() {
        assert_eq!(
            Rgb::from_f32(PointN([-3.0, 127.6, 300.0])),
            Rgb::new(0, 128, 255)
        );
    }
}
