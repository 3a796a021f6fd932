use crate::{Ones, Point3i, PointN};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// A box of lattice points: every `p` with `minimum <= p < minimum + shape` in each component. Blocks, and the voxels
/// inside of them, are addressed by extents.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Extent3i {
    pub minimum: Point3i,
    pub shape: Point3i,
}

impl Extent3i {
    #[inline]
    pub fn from_min_and_shape(minimum: Point3i, shape: Point3i) -> Self {
        Self { minimum, shape }
    }

    /// The extent spanning `minimum` through `max`, both included. Empty if `max` is below `minimum` on any axis.
    #[inline]
    pub fn from_min_and_max(minimum: Point3i, max: Point3i) -> Self {
        let lub = max + Point3i::ONES;
        let PointN([x, y, z]) = lub - minimum;

        Self::from_min_and_shape(minimum, PointN([x.max(0), y.max(0), z.max(0)]))
    }

    /// One past the greatest point on each axis.
    #[inline]
    pub fn least_upper_bound(&self) -> Point3i {
        self.minimum + self.shape
    }

    /// The greatest point in the extent.
    #[inline]
    pub fn max(&self) -> Point3i {
        self.least_upper_bound() - Point3i::ONES
    }

    #[inline]
    pub fn contains(&self, p: Point3i) -> bool {
        let lub = self.least_upper_bound();

        (0..3).all(|axis| self.minimum.0[axis] <= p.0[axis] && p.0[axis] < lub.0[axis])
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.shape.0.iter().map(|&s| s.max(0) as usize).product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }

    /// Every point in the extent, X fastest.
    ///
    /// ```
    /// # use sparse_fusion_core::prelude::*;
    /// let extent = Extent3i::from_min_and_shape(PointN([0, 0, 0]), PointN([2, 2, 1]));
    /// let points: Vec<_> = extent.iter_points().collect();
    /// assert_eq!(points, vec![
    ///     PointN([0, 0, 0]), PointN([1, 0, 0]), PointN([0, 1, 0]), PointN([1, 1, 0])
    /// ]);
    /// ```
    pub fn iter_points(&self) -> impl Iterator<Item = Point3i> {
        let min = self.minimum;
        let lub = self.least_upper_bound();

        iproduct!(min.z()..lub.z(), min.y()..lub.y(), min.x()..lub.x())
            .map(|(z, y, x)| PointN([x, y, z]))
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod test {
    use super::*;

    use crate::{Point, SmallZero};
    use pretty_assertions::assert_eq;

    #[test]
    fn iteration_visits_each_point_once_x_fastest() {
        let extent = Extent3i::from_min_and_shape(PointN([-1, 0, 5]), PointN([2, 2, 2]));

        let points: Vec<_> = extent.iter_points().collect();

        assert_eq!(points.len(), extent.num_points());
        assert_eq!(points[0], PointN([-1, 0, 5]));
        assert_eq!(points[1], PointN([0, 0, 5]));
        assert_eq!(points[2], PointN([-1, 1, 5]));
        assert_eq!(points[7], extent.max());
        assert!(points.iter().all(|p| extent.contains(*p)));
    }

    #[test]
    fn inverted_bounds_are_empty() {
        let extent = Extent3i::from_min_and_max(Point3i::fill(3), Point3i::fill(1));

        assert_eq!(extent.shape, Point3i::ZERO);
        assert!(extent.is_empty());
        assert_eq!(extent.iter_points().count(), 0);
    }

    #[test]
    fn contains_is_half_open() {
        let block = Extent3i::from_min_and_shape(Point3i::ZERO, Point3i::fill(8));

        assert!(block.contains(PointN([0, 7, 3])));
        assert!(!block.contains(PointN([8, 0, 0])));
        assert!(!block.contains(PointN([0, -1, 0])));
    }
}
