use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::BlockIndexer;

/// Metric placement of the voxel lattice.
///
/// Voxel `X` is sampled at `(X + 0.5) * voxel_length` in the volume frame, and the volume frame is placed in the world by
/// `volume_to_world`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGrid {
    indexer: BlockIndexer,
    voxel_length: f32,
    volume_to_world: RigidTransform,
    world_to_volume: RigidTransform,
}

impl VolumeGrid {
    pub fn new(indexer: BlockIndexer, voxel_length: f32, volume_to_world: RigidTransform) -> Self {
        Self {
            indexer,
            voxel_length,
            volume_to_world,
            world_to_volume: volume_to_world.inverse(),
        }
    }

    #[inline]
    pub fn indexer(&self) -> &BlockIndexer {
        &self.indexer
    }

    #[inline]
    pub fn voxel_length(&self) -> f32 {
        self.voxel_length
    }

    #[inline]
    pub fn block_length(&self) -> f32 {
        self.indexer.block_side() as f32 * self.voxel_length
    }

    #[inline]
    pub fn volume_to_world(&self) -> &RigidTransform {
        &self.volume_to_world
    }

    #[inline]
    pub fn world_to_volume(&self) -> &RigidTransform {
        &self.world_to_volume
    }

    /// Volume-frame position of a voxel's sample.
    #[inline]
    pub fn voxel_center(&self, voxel: Point3i) -> Point3f {
        (Point3f::from(voxel) + Point3f::fill(0.5)) * self.voxel_length
    }

    /// Continuous voxel coordinates of a volume-frame point, such that voxel samples sit on integers.
    #[inline]
    pub fn voxel_coordinates(&self, p: Point3f) -> Point3f {
        p / self.voxel_length - Point3f::fill(0.5)
    }

    #[inline]
    pub fn voxel_containing_point(&self, p: Point3f) -> Point3i {
        (p / self.voxel_length).in_voxel()
    }

    #[inline]
    pub fn block_containing_point(&self, p: Point3f) -> Point3i {
        self.indexer
            .block_containing_voxel(self.voxel_containing_point(p))
    }

    /// Volume-frame corners of block `key`.
    pub fn block_corners(&self, key: Point3i) -> [Point3f; 8] {
        let mut corners = [Point3f::ZERO; 8];
        for (corner, offset) in corners.iter_mut().zip(Point3i::corner_offsets()) {
            *corner = Point3f::from(key + offset) * self.block_length();
        }

        corners
    }

    /// Distance along a ray from `origin` in direction `dir` to where it leaves block `key`.
    pub fn block_exit_distance(&self, key: Point3i, origin: Point3f, dir: Point3f) -> f32 {
        let min = Point3f::from(key) * self.block_length();
        let max = Point3f::from(key + Point3i::ONES) * self.block_length();

        let mut exit = std::f32::INFINITY;
        for axis in 0..3 {
            let d = dir.0[axis];
            let bound = if d > 0.0 {
                max.0[axis]
            } else if d < 0.0 {
                min.0[axis]
            } else {
                continue;
            };
            exit = exit.min((bound - origin.0[axis]) / d);
        }

        exit
    }
}

/// A camera pose expressed relative to the volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraView {
    pub intrinsics: PinholeIntrinsics,
    pub camera_to_volume: RigidTransform,
    pub volume_to_camera: RigidTransform,
}

impl CameraView {
    pub fn new(
        grid: &VolumeGrid,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> Self {
        let camera_to_volume = grid.world_to_volume().compose(camera_to_world);

        Self {
            intrinsics: *intrinsics,
            camera_to_volume,
            volume_to_camera: camera_to_volume.inverse(),
        }
    }

    /// The camera center in the volume frame.
    #[inline]
    pub fn origin(&self) -> Point3f {
        self.camera_to_volume.translation
    }

    /// Volume-frame unit direction of the ray through pixel `(u, v)`, and the camera-frame depth gained per unit of
    /// distance along it.
    #[inline]
    pub fn pixel_ray(&self, u: f32, v: f32) -> Option<(Point3f, f32)> {
        let dir_camera = self.intrinsics.inverse_project(u, v, 1.0).normalized()?;

        Some((self.camera_to_volume.rotate(dir_camera), dir_camera.z()))
    }

    /// Returns the pixel that sees volume-frame point `p` and the depth of `p`, if it is in front of the camera.
    #[inline]
    pub fn pixel_of(&self, p: Point3f) -> Option<((usize, usize), f32)> {
        let p_camera = self.volume_to_camera.transform_point(p);
        let (u, v) = self.intrinsics.project(p_camera)?;

        Some((self.intrinsics.nearest_pixel(u, v)?, p_camera.z()))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
