use crate::{DotProduct, Point3f, PointN};

use core::ops::Mul;
use serde::{Deserialize, Serialize};

/// A rigid body transform (rotation followed by translation), stored as the upper 3x4 block of a homogeneous matrix.
///
/// Camera poses are given as camera-to-world transforms. The volume itself may also be placed in the world with a
/// volume-to-world transform.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct RigidTransform {
    /// Row-major rotation matrix.
    pub rotation: [[f32; 3]; 3],
    pub translation: Point3f,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: PointN([0.0; 3]),
        }
    }

    pub fn from_translation(translation: Point3f) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn from_rotation_and_translation(rotation: [[f32; 3]; 3], translation: Point3f) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Rotation of `angle` radians about the unit vector `axis` (Rodrigues' formula).
    pub fn from_axis_angle(axis: Point3f, angle: f32) -> Self {
        let [x, y, z] = axis.0;
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;

        Self::from_rotation_and_translation(
            [
                [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
                [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
                [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
            ],
            PointN([0.0; 3]),
        )
    }

    /// Applies only the rotation part, e.g. to a direction or a normal.
    #[inline]
    pub fn rotate(&self, v: Point3f) -> Point3f {
        let r = &self.rotation;

        PointN([
            PointN(r[0]).dot(&v),
            PointN(r[1]).dot(&v),
            PointN(r[2]).dot(&v),
        ])
    }

    #[inline]
    pub fn transform_point(&self, p: Point3f) -> Point3f {
        self.rotate(p) + self.translation
    }

    /// The inverse of a rigid transform is the transposed rotation with the translation rotated back.
    pub fn inverse(&self) -> Self {
        let r = &self.rotation;
        let rotation = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ];
        let inverse = Self::from_rotation_and_translation(rotation, PointN([0.0; 3]));
        let translation = inverse.rotate(self.translation) * -1.0;

        Self {
            translation,
            ..inverse
        }
    }

    /// The transform that applies `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        let a = &self.rotation;
        let b = &other.rotation;
        let mut rotation = [[0.0; 3]; 3];
        for (i, row) in rotation.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }

        Self {
            rotation,
            translation: self.transform_point(other.translation),
        }
    }
}

impl Mul for RigidTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.compose(&rhs)
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

    use crate::Norm;

    fn assert_close(a: Point3f, b: Point3f) {
        assert!((a - b).norm() < 1e-5, "{:?} != {:?}", a, b);
    }

    #[test]
    fn inverse_undoes_transform() {
        let rotation = RigidTransform::from_axis_angle(PointN([0.0, 1.0, 0.0]), 0.7);
        let pose = RigidTransform::from_translation(PointN([1.0, -2.0, 0.5])) * rotation;
        let p = PointN([0.3, 0.2, 1.5]);

        assert_close(pose.inverse().transform_point(pose.transform_point(p)), p);
        assert_close((pose * pose.inverse()).transform_point(p), p);
    }

    #[test]
    fn quarter_turn_about_z_maps_x_to_y() {
        let rotation =
            RigidTransform::from_axis_angle(PointN([0.0, 0.0, 1.0]), std::f32::consts::FRAC_PI_2);

        assert_close(
            rotation.rotate(PointN([1.0, 0.0, 0.0])),
            PointN([0.0, 1.0, 0.0]),
        );
    }
}
