//! A scalable TSDF volume that fuses depth frames into sparse voxel blocks.
//!
//! A frame is fused in three passes over a `ScalableTsdfVolume`, each ordered after the previous one:
//!   1. `touch`: every depth pixel walks the truncation band along its ray and allocates the blocks it passes through
//!   2. `compact_in_frustum` (or `compact_all`): lists each allocated block that may be visible exactly once
//!   3. `integrate_active`: updates the voxels of the listed blocks with the running TSDF average
//!
//! `integrate` runs all three. Afterwards, `ray_cast` and `render` march rays through the volume without allocating,
//! `extract_surface_points` samples the zero crossings, `downsample` builds a half-resolution copy, and the
//! `download_*`/`upload_*` methods move blocks in and out for saving and restoring.
//!
//! ```
//! use sparse_fusion_core::prelude::*;
//! use sparse_fusion_volume::prelude::*;
//!
//! let config = TsdfVolumeConfig::default()
//!     .with_bucket_count(1000)
//!     .with_value_capacity(4000)
//!     .with_color(false);
//! let mut volume = ScalableTsdfVolume::with_config(config).unwrap();
//!
//! let camera = PinholeIntrinsics::new(32, 24, 16.0, 16.0, 15.5, 11.5);
//! let depth = DepthImage::fill(32, 24, 1.0);
//! let report = volume
//!     .integrate(&depth, None, &camera, &RigidTransform::identity())
//!     .unwrap();
//! assert!(!report.is_degraded());
//!
//! let cast = volume.ray_cast(&camera, &RigidTransform::identity()).unwrap();
//! let center_depth = cast.depth_at(16, 12).unwrap();
//! assert!((center_depth - 1.0).abs() < 0.01);
//! ```

mod compact;
mod downsample;
mod integrate;
mod surface;
mod touch;

pub mod config;
pub mod error;
pub mod grid;
pub mod interpolation;
pub mod ray_cast;
pub mod report;
pub mod transfer;
pub mod volume;

pub use config::{DepthRange, TsdfVolumeConfig, MAX_STORED_VOXELS};
pub use error::{FusionError, FusionResult};
pub use grid::{CameraView, VolumeGrid};
pub use interpolation::{HashedVoxels, NeighborCache, TsdfSample, VoxelSource};
pub use ray_cast::{RayCastImage, SurfaceSample};
pub use report::{FrameReport, TouchReport};
pub use transfer::VoxelBlock;
pub use volume::ScalableTsdfVolume;

pub mod prelude {
    pub use super::{
        FrameReport, FusionError, RayCastImage, ScalableTsdfVolume, SurfaceSample, TouchReport,
        TsdfVolumeConfig, VoxelBlock, VoxelSource,
    };
}
