//! Voxel lookups that may cross block boundaries, and the trilinear interpolation and gradients built on them.
//!
//! All coordinates here are continuous voxel coordinates, where voxel `X` is sampled at the integer point `X` (see
//! `VolumeGrid::voxel_coordinates`). Interpolation only produces a value when all 8 surrounding samples have been
//! observed.

use sparse_fusion_core::prelude::*;
use sparse_fusion_storage::{
    neighbors::on_boundary, BlockIndexer, BlockStore, NeighborAddresses, SpatialHashTable, Voxel,
};

/// An interpolated TSDF value and color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TsdfSample {
    pub tsdf: f32,
    pub color: Point3f,
}

/// Random access to voxels by global voxel coordinates.
pub trait VoxelSource {
    fn voxel(&self, voxel: Point3i) -> Option<Voxel>;

    #[inline]
    fn observed_voxel(&self, voxel: Point3i) -> Option<Voxel> {
        self.voxel(voxel).filter(Voxel::is_observed)
    }

    /// Trilinear interpolation of the 8 samples around `coords`.
    fn trilinear(&self, coords: Point3f) -> Option<TsdfSample> {
        let base = coords.floor();
        let [fx, fy, fz] = (coords - base).0;
        let base = base.as_3i();

        let mut tsdf = 0.0;
        let mut color = Point3f::ZERO;
        for offset in Point3i::corner_offsets() {
            let voxel = self.observed_voxel(base + offset)?;
            let w = (if offset.x() == 1 { fx } else { 1.0 - fx })
                * (if offset.y() == 1 { fy } else { 1.0 - fy })
                * (if offset.z() == 1 { fz } else { 1.0 - fz });
            tsdf += w * voxel.tsdf;
            color += voxel.color.to_f32() * w;
        }

        Some(TsdfSample { tsdf, color })
    }

    /// Central difference gradient of the interpolated TSDF at `coords`, per voxel length. Points away from surfaces,
    /// toward the observer.
    fn gradient(&self, coords: Point3f) -> Option<Point3f> {
        let mut gradient = Point3f::ZERO;
        for axis in 0..3 {
            let mut step = Point3f::ZERO;
            step.0[axis] = 1.0;
            let ahead = self.trilinear(coords + step)?.tsdf;
            let behind = self.trilinear(coords - step)?.tsdf;
            gradient.0[axis] = 0.5 * (ahead - behind);
        }

        Some(gradient)
    }

    /// Central difference gradient at a voxel sample, using its 6 face neighbors.
    fn lattice_gradient(&self, voxel: Point3i) -> Option<Point3f> {
        let mut gradient = Point3f::ZERO;
        for axis in 0..3 {
            let mut step = Point3i::ZERO;
            step.0[axis] = 1;
            let ahead = self.observed_voxel(voxel + step)?.tsdf;
            let behind = self.observed_voxel(voxel - step)?.tsdf;
            gradient.0[axis] = 0.5 * (ahead - behind);
        }

        Some(gradient)
    }
}

/// Resolves every voxel through the hash table.
#[derive(Clone, Copy)]
pub struct HashedVoxels<'a> {
    table: &'a SpatialHashTable,
    store: &'a BlockStore,
}

impl<'a> HashedVoxels<'a> {
    pub fn new(table: &'a SpatialHashTable, store: &'a BlockStore) -> Self {
        Self { table, store }
    }

    #[inline]
    pub fn indexer(&self) -> &BlockIndexer {
        self.store.indexer()
    }

    /// The address of block `key`, if it is allocated.
    #[inline]
    pub fn find_block(&self, key: Point3i) -> Option<u32> {
        self.table.find(key)
    }
}

impl VoxelSource for HashedVoxels<'_> {
    #[inline]
    fn voxel(&self, voxel: Point3i) -> Option<Voxel> {
        let indexer = self.store.indexer();
        let address = self.table.find(indexer.block_containing_voxel(voxel))?;

        self.store
            .voxel(address, indexer.global_to_local(voxel))
            .copied()
    }
}

/// Resolves voxels in one block's 3x3x3 neighborhood from addresses looked up once, when the cache is built. Queries
/// outside of the neighborhood find nothing.
///
/// For any voxel in the neighborhood, this gives the same answer as `HashedVoxels`.
#[derive(Clone, Copy)]
pub struct NeighborCache<'a> {
    neighbors: NeighborAddresses,
    store: &'a BlockStore,
    home_min: Point3i,
}

impl<'a> NeighborCache<'a> {
    pub fn new(table: &SpatialHashTable, store: &'a BlockStore, home_key: Point3i) -> Self {
        Self {
            neighbors: NeighborAddresses::resolve(table, home_key),
            store,
            home_min: store.indexer().block_min(home_key),
        }
    }

    #[inline]
    pub fn neighbors(&self) -> &NeighborAddresses {
        &self.neighbors
    }

    #[inline]
    pub fn home_key(&self) -> Point3i {
        self.neighbors.home_key()
    }
}

impl VoxelSource for NeighborCache<'_> {
    #[inline]
    fn voxel(&self, voxel: Point3i) -> Option<Voxel> {
        let indexer = self.store.indexer();
        let local = voxel - self.home_min;
        let interior = indexer.local_extent().contains(local)
            && !on_boundary(local, indexer.block_side());

        let (address, local) = if interior {
            (self.neighbors.home_address()?, local)
        } else {
            self.neighbors.locate(indexer, local)?
        };

        self.store.voxel(address, local).copied()
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const GRADIENT: [f32; 3] = [0.01, 0.02, -0.03];

    fn linear_tsdf(p: Point3i) -> f32 {
        GRADIENT[0] * p.x() as f32 + GRADIENT[1] * p.y() as f32 + GRADIENT[2] * p.z() as f32
    }

    /// Two adjacent blocks along X whose voxels sample a linear field.
    fn two_blocks() -> (SpatialHashTable, BlockStore) {
        let indexer = BlockIndexer::new(8);
        let table = SpatialHashTable::new(16, 8, 8).unwrap();
        let mut store = BlockStore::new(indexer, 8);
        for key in [PointN([0, 0, 0]), PointN([1, 0, 0])].iter() {
            let address = table.activate_or_get(*key).unwrap();
            let block = store.block_mut(address).unwrap();
            for (i, voxel) in block.iter_mut().enumerate() {
                let global = indexer.local_to_global(*key, indexer.local_from_linear(i));
                *voxel = Voxel {
                    tsdf: linear_tsdf(global),
                    color: Rgb::new(100, 50, 25),
                    weight: 1,
                };
            }
        }

        (table, store)
    }

    #[test]
    fn trilinear_reproduces_a_linear_field() {
        let (table, store) = two_blocks();
        let source = HashedVoxels::new(&table, &store);

        let p = PointN([7.25, 3.5, 2.75]);
        let sample = source.trilinear(p).unwrap();
        let expected = GRADIENT[0] * p.x() + GRADIENT[1] * p.y() + GRADIENT[2] * p.z();
        assert!((sample.tsdf - expected).abs() < 1e-5);
        assert!((sample.color - PointN([100.0, 50.0, 25.0])).norm() < 1e-3);

        let gradient = source.gradient(p).unwrap();
        assert!((gradient - PointN(GRADIENT)).norm() < 1e-5);
    }

    #[test]
    fn unobserved_corners_have_no_value() {
        let (table, store) = two_blocks();
        let source = HashedVoxels::new(&table, &store);

        // The -Y neighbor is not allocated.
        assert_eq!(source.trilinear(PointN([3.0, -0.5, 3.0])), None);
        // Past the last allocated block.
        assert_eq!(source.trilinear(PointN([15.5, 3.0, 3.0])), None);
    }

    #[test]
    fn neighbor_cache_agrees_with_hash_lookups() {
        let (table, store) = two_blocks();
        let hashed = HashedVoxels::new(&table, &store);
        let cached = NeighborCache::new(&table, &store, PointN([0, 0, 0]));

        for x in 0..64 {
            for y in 0..8 {
                let p = PointN([-1.0 + x as f32 * 0.25, -0.5 + y as f32, 0.5 + y as f32 * 0.75]);
                assert_eq!(cached.trilinear(p), hashed.trilinear(p));
                assert_eq!(cached.gradient(p), hashed.gradient(p));
            }
        }
        for voxel in Extent3i::from_min_and_shape(PointN([-1; 3]), PointN([10; 3])).iter_points() {
            assert_eq!(cached.voxel(voxel), hashed.voxel(voxel));
            assert_eq!(cached.lattice_gradient(voxel), hashed.lattice_gradient(voxel));
        }
    }

    #[test]
    fn neighbor_cache_ignores_blocks_beyond_the_neighborhood() {
        let (table, store) = two_blocks();
        let cached = NeighborCache::new(&table, &store, PointN([-1, 0, 0]));

        assert!(cached.voxel(PointN([3, 3, 3])).is_some());
        assert_eq!(cached.voxel(PointN([11, 3, 3])), None);
    }
}
