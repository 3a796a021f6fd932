use serde::{Deserialize, Serialize};

/// A point or vector, stored as a plain array of components. Block keys and voxel coordinates are `Point3i`; metric
/// positions and directions are `Point3f`.
///
/// ```
/// use sparse_fusion_core::prelude::*;
///
/// let key: Point3i = PointN([1, -2, 3]);
/// assert_eq!(key + Point3i::ONES, PointN([2, -1, 4]));
/// assert_eq!(key * 8, PointN([8, -16, 24]));
///
/// // Dividing integer points rounds toward negative infinity, so voxel -1 lies in block -1.
/// let voxel: Point3i = PointN([-1, 2, 7]);
/// assert_eq!(voxel / 8, PointN([-1, 0, 0]));
///
/// let direction: Point3f = PointN([0.0, 3.0, 4.0]);
/// assert_eq!(direction.norm(), 5.0);
/// ```
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PointN<N>(pub N);

/// Operations shared by integer and float points.
pub trait Point: Copy + Sized {
    type Scalar: Copy;

    /// A point with every component equal to `value`.
    fn fill(value: Self::Scalar) -> Self;
}

pub trait SmallZero: Copy {
    const ZERO: Self;
}

pub trait Ones: Copy {
    const ONES: Self;
}

pub trait DotProduct {
    type Scalar: Copy;

    fn dot(&self, other: &Self) -> Self::Scalar;
}

pub trait NormSquared {
    fn norm_squared(&self) -> f32;
}

pub trait Norm {
    fn norm(&self) -> f32;
}

impl<T: NormSquared> Norm for T {
    #[inline]
    fn norm(&self) -> f32 {
        self.norm_squared().sqrt()
    }
}

/// Offsets between lattice points.
pub trait IntegerPoint: Point {
    /// The 8 corners of the unit cube, X fastest.
    fn corner_offsets() -> Vec<Self>;

    /// The 27 points of the 3x3x3 neighborhood around the origin, origin included, X fastest.
    fn moore_offsets() -> Vec<Self>;
}
