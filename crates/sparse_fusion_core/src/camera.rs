use crate::{Point3f, PointN};

use serde::{Deserialize, Serialize};

/// A pinhole camera model. Pixel centers lie on integer coordinates, so pixel `(u, v)` looks along the ray through
/// `((u - cx) / fx, (v - cy) / fy, 1)` in the camera frame.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PinholeIntrinsics {
    pub width: usize,
    pub height: usize,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl PinholeIntrinsics {
    pub fn new(width: usize, height: usize, fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
        }
    }

    /// Parameters of the common 640x480 structured light sensors.
    pub fn prime_sense_default() -> Self {
        Self::new(640, 480, 525.0, 525.0, 319.5, 239.5)
    }

    /// Camera-frame point to continuous pixel coordinates. Points at or behind the image plane have no projection.
    #[inline]
    pub fn project(&self, p: Point3f) -> Option<(f32, f32)> {
        if p.z() <= 0.0 {
            return None;
        }

        Some((
            self.fx * p.x() / p.z() + self.cx,
            self.fy * p.y() / p.z() + self.cy,
        ))
    }

    /// Pixel coordinates and depth (along the optical axis) to a camera-frame point.
    #[inline]
    pub fn inverse_project(&self, u: f32, v: f32, depth: f32) -> Point3f {
        PointN([
            (u - self.cx) * depth / self.fx,
            (v - self.cy) * depth / self.fy,
            depth,
        ])
    }

    /// Returns the pixel nearest to `(u, v)`, if it is inside of the image.
    #[inline]
    pub fn nearest_pixel(&self, u: f32, v: f32) -> Option<(usize, usize)> {
        let (x, y) = (u.round(), v.round());
        if x >= 0.0 && y >= 0.0 && (x as usize) < self.width && (y as usize) < self.height {
            Some((x as usize, y as usize))
        } else {
            None
        }
    }

    /// Returns `true` iff the continuous pixel coordinates fall within `margin` pixels of the image.
    #[inline]
    pub fn contains(&self, u: f32, v: f32, margin: f32) -> bool {
        u >= -margin
            && v >= -margin
            && u <= (self.width as f32 - 1.0) + margin
            && v <= (self.height as f32 - 1.0) + margin
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
