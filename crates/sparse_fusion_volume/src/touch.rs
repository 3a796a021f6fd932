use crate::{CameraView, FusionResult, ScalableTsdfVolume, TouchReport, VolumeGrid};

use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::SpatialHashTable;

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, debug_span, warn};

impl ScalableTsdfVolume {
    /// Allocates every block that the truncation band around the observed surface passes through.
    ///
    /// Each pixel walks its ray from `depth - sdf_trunc` to `depth + sdf_trunc` in steps of half a block. This pass
    /// only makes blocks present; use one of the `compact_*` passes to list the blocks a frame should work on. Pool
    /// exhaustion drops the affected blocks and is counted in the report.
    pub fn touch(
        &mut self,
        depth: &DepthImage,
        intrinsics: &PinholeIntrinsics,
        camera_to_world: &RigidTransform,
    ) -> FusionResult<TouchReport> {
        let _span = debug_span!("touch").entered();

        crate::volume::check_image_shape("depth", depth.width(), depth.height(), intrinsics)?;
        let depth_range = self.config().depth_range;
        let sdf_trunc = self.config().sdf_trunc;
        let state = self.state_mut()?;
        let view = CameraView::new(&state.grid, intrinsics, camera_to_world);

        let num_blocks_before = state.table.len();
        let requested = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        {
            let grid = &state.grid;
            let table = &state.table;
            (0..depth.height()).into_par_iter().for_each(|y| {
                for x in 0..depth.width() {
                    let d = match depth.depth_at(x, y) {
                        Some(d) if depth_range.contains(d) => d,
                        _ => continue,
                    };
                    let near = (d - sdf_trunc).max(depth_range.min);
                    let far = d + sdf_trunc;
                    let (n, f) =
                        touch_pixel_segment(grid, table, &view, (x, y), near, far);
                    requested.fetch_add(n, Ordering::Relaxed);
                    failed.fetch_add(f, Ordering::Relaxed);
                }
            });
        }

        // New blocks may reuse slots with stale voxels.
        for &address in state.table.values().allocated_after(num_blocks_before) {
            state.store.initialize(address)?;
        }

        let report = TouchReport {
            requested: requested.into_inner(),
            allocated: state.table.len() - num_blocks_before,
            failed: failed.into_inner(),
        };
        debug!(
            requested = report.requested,
            allocated = report.allocated,
            total = state.table.len(),
            "touched blocks"
        );
        if report.is_degraded() {
            warn!(failed = report.failed, "block allocation exhausted");
        }

        Ok(report)
    }
}

/// Activates the blocks along the ray through `pixel` between camera-frame depths `near` and `far`. Returns the
/// number of requests and failures.
fn touch_pixel_segment(
    grid: &VolumeGrid,
    table: &SpatialHashTable,
    view: &CameraView,
    pixel: (usize, usize),
    near: f32,
    far: f32,
) -> (usize, usize) {
    let (u, v) = (pixel.0 as f32, pixel.1 as f32);
    let to_volume = |z| {
        view.camera_to_volume
            .transform_point(view.intrinsics.inverse_project(u, v, z))
    };
    let start = to_volume(near);
    let end = to_volume(far);

    let step_length = 0.5 * grid.block_length();
    let num_steps = ((end - start).norm() / step_length).ceil().max(1.0) as usize;
    let step = (end - start) / num_steps as f32;

    let mut requested = 0;
    let mut failed = 0;
    let mut last_key = None;
    for i in 0..=num_steps {
        let key = grid.block_containing_point(start + step * i as f32);
        if last_key == Some(key) {
            continue;
        }
        last_key = Some(key);

        requested += 1;
        if table.activate_or_get(key).is_err() {
            failed += 1;
        }
    }

    (requested, failed)
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
