use crate::{
    config::DepthRange, volume::VolumeState, CameraView, FrameReport, FusionResult,
    ScalableTsdfVolume, VolumeGrid,
};

use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::Voxel;

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, debug_span};

/// The per-voxel parameters of one frame.
#[derive(Clone, Copy)]
struct FrameUpdate<'a> {
    view: CameraView,
    depth: &'a DepthImage,
    color: Option<&'a ColorImage>,
    depth_range: DepthRange,
    sdf_trunc: f32,
    max_weight: u8,
}

impl ScalableTsdfVolume {
    /// Fuses one depth frame, and optionally a color frame registered to it, into the volume.
    ///
    /// Runs `touch`, `compact_in_frustum` and `integrate_active` in that order. Allocation failures during the touch
    /// pass don't stop the frame; the blocks that could not be allocated are skipped and counted in the report.
    pub fn integrate(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<FrameReport> {
        let _span = debug_span!("integrate").entered();

        self.check_frame(depth, color, intrinsics)?;
        let touch = self.touch(depth, intrinsics, camera_to_world)?;
        let active_blocks = self.compact_in_frustum(intrinsics, camera_to_world)?;
        let updated_voxels = self.integrate_active(depth, color, intrinsics, camera_to_world)?;

        Ok(FrameReport {
            touch,
            active_blocks,
            updated_voxels,
        })
    }

    /// Updates every voxel of the active blocks that the frame observes. Returns the number of updated voxels.
    ///
    /// A voxel is updated when its center projects into the image onto a valid depth `d`, and its own depth `z` along
    /// the optical axis satisfies `d - z >= -sdf_trunc`. The stored TSDF is `min((d - z) / sdf_trunc, 1)` averaged
    /// over observations, and the weight saturates at `max_weight`.
    pub fn integrate_active(
        &mut self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<usize> {
        self.check_frame(depth, color, intrinsics)?;
        let config = self.config();
        let color = if config.integrate_color { color } else { None };
        let depth_range = config.depth_range;
        let sdf_trunc = config.sdf_trunc;
        let max_weight = config.max_weight;

        let VolumeState {
            grid,
            store,
            active,
            ..
        } = self.state_mut()?;
        let frame = FrameUpdate {
            view: CameraView::new(grid, intrinsics, camera_to_world),
            depth,
            color,
            depth_range,
            sdf_trunc,
            max_weight,
        };
        let grid = &*grid;
        let active = &*active;

        let updated = AtomicUsize::new(0);
        store
            .par_blocks_mut()
            .enumerate()
            .for_each(|(address, voxels)| {
                let key = match active
                    .position(address as u32)
                    .and_then(|p| active.entries().get(p))
                {
                    Some(entry) => entry.key,
                    None => return,
                };
                let n = integrate_block(grid, &frame, key, voxels);
                updated.fetch_add(n, Ordering::Relaxed);
            });
        let updated = updated.into_inner();
        debug!(active = active.len(), updated_voxels = updated, "integrated frame");

        Ok(updated)
    }
}

fn integrate_block(grid: &VolumeGrid, frame: &FrameUpdate, key: Point3i, voxels: &mut [Voxel]) -> usize {
    let indexer = grid.indexer();
    let mut updated = 0;
    for (i, voxel) in voxels.iter_mut().enumerate() {
        let global = indexer.local_to_global(key, indexer.local_from_linear(i));
        if integrate_voxel(frame, grid.voxel_center(global), voxel) {
            updated += 1;
        }
    }

    updated
}

fn integrate_voxel(frame: &FrameUpdate, center: Point3f, voxel: &mut Voxel) -> bool {
    let ((x, y), z) = match frame.view.pixel_of(center) {
        Some(p) => p,
        None => return false,
    };
    let d = match frame.depth.depth_at(x, y) {
        Some(d) if frame.depth_range.contains(d) => d,
        _ => return false,
    };
    let sdf = d - z;
    if sdf < -frame.sdf_trunc {
        return false;
    }
    let tsdf = (sdf / frame.sdf_trunc).min(1.0);

    let w = voxel.weight as f32;
    voxel.tsdf = (voxel.tsdf * w + tsdf) / (w + 1.0);
    if let Some(observed) = frame.color.and_then(|c| c.get(x, y)) {
        let blended = (voxel.color.to_f32() * w + observed.to_f32()) / (w + 1.0);
        voxel.color = Rgb::from_f32(blended);
    }
    voxel.weight = voxel.weight.saturating_add(1).min(frame.max_weight);

    true
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
