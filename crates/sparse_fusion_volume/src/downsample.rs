use crate::{FusionResult, ScalableTsdfVolume, TouchReport, TsdfVolumeConfig};

use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::{BlockIndexer, BlockStore, HashEntry, SmallKeyHashMap, Voxel};

use rayon::prelude::*;
use tracing::{debug, debug_span, warn};

#[derive(Clone, Copy, Default)]
struct VoxelSum {
    tsdf: f32,
    weight: u32,
    color: [f32; 3],
    count: u32,
}

impl VoxelSum {
    fn add_voxel(&mut self, voxel: &Voxel) {
        self.tsdf += voxel.tsdf;
        self.weight += voxel.weight as u32;
        for (sum, c) in self.color.iter_mut().zip(voxel.color.0.iter()) {
            *sum += *c as f32;
        }
        self.count += 1;
    }

    fn add(&mut self, other: &Self) {
        self.tsdf += other.tsdf;
        self.weight += other.weight;
        for (sum, c) in self.color.iter_mut().zip(other.color.iter()) {
            *sum += *c;
        }
        self.count += other.count;
    }

    /// Distances are the same, but the coarse truncation distance is twice as long.
    fn coarse_voxel(&self, max_weight: u8) -> Voxel {
        let n = self.count as f32;
        let weight = (self.weight as f32 / n).round().max(1.0).min(max_weight as f32);

        Voxel {
            tsdf: 0.5 * self.tsdf / n,
            color: Rgb::from_f32(PointN(self.color) / n),
            weight: weight as u8,
        }
    }
}

type CoarseSums = SmallKeyHashMap<Point3i, VoxelSum>;

impl ScalableTsdfVolume {
    /// Builds a volume of half the resolution: same block side, twice the voxel length and twice the truncation distance.
    /// Each coarse voxel is the average of the observed fine voxels it covers.
    ///
    /// The coarse volume gets the same capacities. It can't need more blocks than this volume has, so allocation only
    /// fails if the hash table chains are exhausted. Blocks that fail are left out, and the report counts them.
    pub fn downsample(&self) -> FusionResult<(ScalableTsdfVolume, TouchReport)> {
        let config = self.config();
        let coarse_config = config
            .clone()
            .with_voxel_length(2.0 * config.voxel_length)
            .with_sdf_trunc(2.0 * config.sdf_trunc);

        self.downsample_with(coarse_config)
    }

    fn downsample_with(
        &self,
        coarse_config: TsdfVolumeConfig,
    ) -> FusionResult<(ScalableTsdfVolume, TouchReport)> {
        let _span = debug_span!("downsample").entered();

        let state = self.state()?;
        let max_weight = coarse_config.max_weight;
        let mut coarse = ScalableTsdfVolume::with_config(coarse_config)?;

        let entries: Vec<HashEntry> = state.table.iter().collect();
        let indexer = *state.grid.indexer();
        let sums = entries
            .par_iter()
            .fold(CoarseSums::default, |mut sums, entry| {
                sum_block(&indexer, &state.store, *entry, &mut sums);
                sums
            })
            .reduce(CoarseSums::default, merge_sums);

        let coarse_state = coarse.state_mut()?;
        let coarse_indexer = *coarse_state.grid.indexer();
        // `None` for blocks that could not be allocated.
        let mut addresses: SmallKeyHashMap<Point3i, Option<u32>> = SmallKeyHashMap::default();
        for (voxel, sum) in sums.iter() {
            let key = coarse_indexer.block_containing_voxel(*voxel);
            let table = &coarse_state.table;
            let address = match *addresses
                .entry(key)
                .or_insert_with(|| table.activate_or_get(key).ok())
            {
                Some(address) => address,
                None => continue,
            };
            let index = coarse_indexer.linear_index(coarse_indexer.global_to_local(*voxel));
            if let Some(target) = coarse_state
                .store
                .block_mut(address)
                .and_then(|block| block.get_mut(index))
            {
                *target = sum.coarse_voxel(max_weight);
            }
        }

        let report = TouchReport {
            requested: addresses.len(),
            allocated: coarse_state.table.len(),
            failed: addresses.values().filter(|a| a.is_none()).count(),
        };
        if report.is_degraded() {
            warn!(failed = report.failed, "coarse blocks dropped for lack of hash table space");
        }
        debug!(
            fine_blocks = entries.len(),
            coarse_blocks = report.allocated,
            "downsampled volume"
        );

        Ok((coarse, report))
    }
}

fn sum_block(indexer: &BlockIndexer, store: &BlockStore, entry: HashEntry, sums: &mut CoarseSums) {
    let voxels = match store.block(entry.address) {
        Some(voxels) => voxels,
        None => return,
    };
    for (i, voxel) in voxels.iter().enumerate() {
        if !voxel.is_observed() {
            continue;
        }
        let global = indexer.local_to_global(entry.key, indexer.local_from_linear(i));
        sums.entry(global / 2).or_default().add_voxel(voxel);
    }
}

fn merge_sums(mut a: CoarseSums, mut b: CoarseSums) -> CoarseSums {
    if a.len() < b.len() {
        std::mem::swap(&mut a, &mut b);
    }
    for (voxel, sum) in b.drain() {
        a.entry(voxel).or_default().add(&sum);
    }

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

    use crate::FusionError;

    use pretty_assertions::assert_eq;
    use utilities::data_sets::{planar_depth, small_camera, uniform_color};

    fn plane_volume() -> ScalableTsdfVolume {
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
                Some(&uniform_color(&camera, Rgb::new(90, 60, 30))),
                &camera,
                &RigidTransform::identity(),
            )
            .unwrap();

        volume
    }

    #[test]
    fn coarse_voxels_average_their_children() {
        let fine = plane_volume();

        let (coarse, report) = fine.downsample().unwrap();

        assert!((coarse.config().voxel_length - 0.02).abs() < 1e-6);
        assert!((coarse.config().sdf_trunc - 0.06).abs() < 1e-6);
        assert!(coarse.num_blocks() > 0);
        assert!(coarse.num_blocks() <= fine.num_blocks());
        assert_eq!(report.check(), Ok(report));
        assert_eq!(report.requested, coarse.num_blocks());
        assert_eq!(report.allocated, coarse.num_blocks());

        // Coarse voxel 41 along Z covers fine voxels 82 and 83, whose centers are 2 and 1 voxels in front of the plane.
        let front = coarse.voxel(PointN([0, 0, 41])).unwrap().unwrap();
        assert!((front.tsdf - 0.25).abs() < 1e-4);
        assert_eq!(front.weight, 1);
        assert_eq!(front.color, Rgb::new(90, 60, 30));

        let back = coarse.voxel(PointN([0, 0, 42])).unwrap().unwrap();
        assert!((back.tsdf + 1.0 / 12.0).abs() < 1e-4);
    }

    #[test]
    fn coarse_volume_still_ray_casts_the_plane() {
        let (coarse, _) = plane_volume().downsample().unwrap();
        let camera = small_camera();

        let cast = coarse
            .ray_cast(&camera, &RigidTransform::identity())
            .unwrap();

        for y in 8..camera.height - 8 {
            for x in 8..camera.width - 8 {
                let depth = cast.depth_at(x, y).unwrap();
                assert!((depth - 0.845).abs() < 0.02, "depth {} at {:?}", depth, (x, y));
            }
        }
    }

    #[test]
    fn blocks_that_do_not_fit_are_counted() {
        let fine = plane_volume();
        // Two buckets and one chain node hold at most three coarse blocks.
        let coarse_config = fine
            .config()
            .clone()
            .with_voxel_length(0.02)
            .with_sdf_trunc(0.06)
            .with_bucket_count(2)
            .with_chain_capacity(1);

        let (coarse, report) = fine.downsample_with(coarse_config).unwrap();

        assert!(report.is_degraded());
        assert!(coarse.num_blocks() <= 3);
        assert_eq!(report.allocated, coarse.num_blocks());
        assert_eq!(report.allocated + report.failed, report.requested);
        assert_eq!(
            report.check(),
            Err(FusionError::AllocationExhausted {
                failed: report.failed
            })
        );
    }
}
