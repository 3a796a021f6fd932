//! The core data types for sparse volumetric fusion:
//! - `PointN`: an N-dimensional point, most importantly `Point3i` (voxel and block keys) and `Point3f`
//! - `Extent3i`: a box of lattice points
//! - `RigidTransform` and `PinholeIntrinsics`: the camera model
//! - `Image`: depth and color frames
//! - `PointCloud` and `TriangleMesh`: reconstruction outputs

pub mod camera;
pub mod extent;
pub mod geometry;
pub mod image;
pub mod point;
pub mod point3;
pub mod transform;

pub use camera::PinholeIntrinsics;
pub use extent::Extent3i;
pub use geometry::{Geometry, PointCloud, TriangleMesh};
pub use image::{ColorImage, DepthImage, Image, Rgb};
pub use point::{DotProduct, IntegerPoint, Norm, NormSquared, Ones, Point, PointN, SmallZero};
pub use point3::{Point3, Point3f, Point3i};
pub use transform::RigidTransform;

pub use num;

pub mod prelude {
    pub use super::{
        ColorImage, DepthImage, DotProduct, Extent3i, Geometry, Image, IntegerPoint, Norm,
        NormSquared, Ones, PinholeIntrinsics, Point, Point3, Point3f, Point3i, PointCloud, PointN,
        Rgb, RigidTransform, SmallZero, TriangleMesh,
    };
}
