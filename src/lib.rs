//! Real-time dense reconstruction: fuse a stream of depth frames into a sparse, unbounded TSDF volume, and render it by
//! ray casting.
//!
//! This library is organized into several crates:
//! - **core**: lattice points and extents, rigid transforms, the pinhole camera, images and output geometry
//! - **storage**: the concurrent spatial hash of voxel blocks and the lock-free pools and buffers beneath it
//! - **volume**: `ScalableTsdfVolume` and its touch, compact, integrate, ray cast and downsample passes
//!
//! Start with the `ScalableTsdfVolume` docs in the volume crate.

pub use sparse_fusion_core as core;
pub use sparse_fusion_storage as storage;
pub use sparse_fusion_volume as volume;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
    pub use super::volume::prelude::*;
}
