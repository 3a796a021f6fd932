use crate::{config::DepthRange, CameraView, FusionResult, ScalableTsdfVolume, VolumeGrid};

use sparse_fusion_core::prelude::*;

use tracing::{debug, debug_span};

impl ScalableTsdfVolume {
    /// Rebuilds the active block list from the allocated blocks that may be seen by the given camera. Returns the
    /// number of active blocks.
    ///
    /// The visibility test is conservative: a block is kept when the bounding box of its projected corners overlaps the
    /// image and its depth interval overlaps the depth range, widened by the truncation distance.
    pub fn compact_in_frustum(
        &mut self,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<usize> {
        let _span = debug_span!("compact").entered();

        let depth_range = self.config().depth_range;
        let sdf_trunc = self.config().sdf_trunc;
        let state = self.state_mut()?;
        let view = CameraView::new(&state.grid, intrinsics, camera_to_world);
        let grid = state.grid;
        let num_active = state.active.compact(&state.table, |key| {
            block_may_be_visible(&grid, &view, depth_range, sdf_trunc, key)
        })?;
        debug!(
            active = num_active,
            allocated = state.table.len(),
            "compacted blocks in frustum"
        );

        Ok(num_active)
    }

    /// Rebuilds the active block list from every allocated block.
    pub fn compact_all(&mut self) -> FusionResult<usize> {
        let _span = debug_span!("compact").entered();

        let state = self.state_mut()?;
        let num_active = state.active.compact(&state.table, |_| true)?;
        debug!(active = num_active, "compacted all blocks");

        Ok(num_active)
    }

    /// Empties the active block list and its reverse index.
    pub fn reset_active_indices(&mut self) -> FusionResult<()> {
        self.state_mut()?.active.clear();

        Ok(())
    }
}

fn block_may_be_visible(
    grid: &VolumeGrid,
    view: &CameraView,
    depth_range: DepthRange,
    sdf_trunc: f32,
    key: Point3i,
) -> bool {
    let mut min_depth = std::f32::INFINITY;
    let mut max_depth = std::f32::NEG_INFINITY;
    let mut u_bounds = (std::f32::INFINITY, std::f32::NEG_INFINITY);
    let mut v_bounds = (std::f32::INFINITY, std::f32::NEG_INFINITY);
    let mut any_behind = false;
    for corner in grid.block_corners(key).iter() {
        let p = view.volume_to_camera.transform_point(*corner);
        min_depth = min_depth.min(p.z());
        max_depth = max_depth.max(p.z());
        match view.intrinsics.project(p) {
            Some((u, v)) => {
                u_bounds = (u_bounds.0.min(u), u_bounds.1.max(u));
                v_bounds = (v_bounds.0.min(v), v_bounds.1.max(v));
            }
            None => any_behind = true,
        }
    }

    if max_depth < depth_range.min - sdf_trunc || min_depth > depth_range.max + sdf_trunc {
        return false;
    }
    // The block straddles the image plane, so its projection is unbounded.
    if any_behind {
        return true;
    }

    let margin = 0.5;
    let width = view.intrinsics.width as f32;
    let height = view.intrinsics.height as f32;

    u_bounds.1 >= -margin
        && u_bounds.0 <= width - 1.0 + margin
        && v_bounds.1 >= -margin
        && v_bounds.0 <= height - 1.0 + margin
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
