use crate::{
    interpolation::{NeighborCache, VoxelSource},
    FusionResult, ScalableTsdfVolume, VolumeGrid,
};

use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::Voxel;

use rayon::prelude::*;
use tracing::{debug, debug_span};

impl ScalableTsdfVolume {
    /// Collects the zero crossings between neighboring observed voxels of every allocated block as points, with normals
    /// and colors, in world coordinates.
    ///
    /// This replaces the active block list with all allocated blocks.
    pub fn extract_surface_points(&mut self) -> FusionResult<PointCloud> {
        let _span = debug_span!("extract_surface_points").entered();

        self.compact_all()?;
        let state = self.state()?;
        let cloud = state
            .active
            .entries()
            .par_iter()
            .map(|entry| {
                let cache = NeighborCache::new(&state.table, &state.store, entry.key);
                block_surface_points(&state.grid, &cache)
            })
            .reduce(PointCloud::default, concat);
        debug!(points = cloud.len(), "extracted surface points");

        Ok(cloud)
    }
}

fn block_surface_points(grid: &VolumeGrid, cache: &NeighborCache) -> PointCloud {
    let indexer = grid.indexer();
    let mut cloud = PointCloud::default();
    for local in indexer.local_extent().iter_points() {
        let voxel = indexer.local_to_global(cache.home_key(), local);
        let here = match cache.observed_voxel(voxel) {
            Some(v) => v,
            None => continue,
        };

        // Each edge is owned by its lower voxel, so every crossing is found once.
        for axis in 0..3 {
            let mut step = Point3i::ZERO;
            step.0[axis] = 1;
            if let Some((point, normal, color)) = edge_crossing(grid, cache, voxel, here, step) {
                cloud.push(point, normal, color);
            }
        }
    }

    cloud
}

fn edge_crossing(
    grid: &VolumeGrid,
    cache: &NeighborCache,
    voxel: Point3i,
    here: Voxel,
    step: Point3i,
) -> Option<(Point3f, Point3f, Rgb)> {
    let there = cache.observed_voxel(voxel + step)?;
    if (here.tsdf >= 0.0) == (there.tsdf >= 0.0) {
        return None;
    }

    let t = here.tsdf / (here.tsdf - there.tsdf);
    let lerp = |a: Point3f, b: Point3f| a * (1.0 - t) + b * t;
    let normal = lerp(
        cache.lattice_gradient(voxel)?,
        cache.lattice_gradient(voxel + step)?,
    )
    .normalized()?;
    let color = lerp(here.color.to_f32(), there.color.to_f32());
    let point = grid.voxel_center(voxel) + Point3f::from(step) * (t * grid.voxel_length());

    let volume_to_world = grid.volume_to_world();

    Some((
        volume_to_world.transform_point(point),
        volume_to_world.rotate(normal),
        Rgb::from_f32(color),
    ))
}

fn concat(mut a: PointCloud, mut b: PointCloud) -> PointCloud {
    a.points.append(&mut b.points);
    a.normals.append(&mut b.normals);
    a.colors.append(&mut b.colors);

    a
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

    use crate::TsdfVolumeConfig;

    use utilities::data_sets::{planar_depth, small_camera, uniform_color};

    #[test]
    fn points_lie_on_the_integrated_plane() {
        let config = TsdfVolumeConfig::default()
            .with_voxel_length(0.01)
            .with_sdf_trunc(0.03)
            .with_bucket_count(1021)
            .with_value_capacity(4096);
        let camera = small_camera();
        let mut volume = ScalableTsdfVolume::with_config(config).unwrap();
        volume
            .integrate(
                &planar_depth(&camera, 0.845),
                Some(&uniform_color(&camera, Rgb::new(10, 20, 30))),
                &camera,
                &RigidTransform::identity(),
            )
            .unwrap();

        let cloud = volume.extract_surface_points().unwrap();

        assert!(cloud.len() > 100);
        assert_eq!(cloud.normals.len(), cloud.len());
        for ((point, normal), color) in cloud
            .points
            .iter()
            .zip(cloud.normals.iter())
            .zip(cloud.colors.iter())
        {
            assert!((point.z() - 0.845).abs() < 1e-3, "point {:?}", point);
            assert!(normal.z() < -0.9, "normal {:?}", normal);
            assert_eq!(*color, Rgb::new(10, 20, 30));
        }
    }

    #[test]
    fn empty_volume_has_no_surface() {
        let mut volume = ScalableTsdfVolume::with_config(
            TsdfVolumeConfig::default()
                .with_bucket_count(16)
                .with_value_capacity(16),
        )
        .unwrap();

        assert!(volume.extract_surface_points().unwrap().is_empty());
    }
}
