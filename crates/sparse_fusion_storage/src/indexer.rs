use sparse_fusion_core::prelude::*;

use serde::{Deserialize, Serialize};

/// Converts between global voxel coordinates, block keys and voxel coordinates local to a block.
///
/// A block key `K` covers the voxels in `[K * N, (K + 1) * N)` on every axis, where `N` is the block side length. This
/// holds for negative coordinates too, i.e. voxel `-1` lives in block `-1`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockIndexer {
    block_side: i32,
}

impl BlockIndexer {
    #[inline]
    pub fn new(block_side: i32) -> Self {
        debug_assert!(block_side > 0);

        Self { block_side }
    }

    #[inline]
    pub fn block_side(&self) -> i32 {
        self.block_side
    }

    /// The constant shape of a block. The same for all blocks.
    #[inline]
    pub fn block_shape(&self) -> Point3i {
        Point3i::fill(self.block_side)
    }

    #[inline]
    pub fn voxels_per_block(&self) -> usize {
        let n = self.block_side as usize;

        n * n * n
    }

    /// Returns the key of the block that contains `voxel`.
    #[inline]
    pub fn block_containing_voxel(&self, voxel: Point3i) -> Point3i {
        voxel / self.block_side
    }

    /// The global coordinates of the least voxel in block `key`.
    #[inline]
    pub fn block_min(&self, key: Point3i) -> Point3i {
        key * self.block_side
    }

    /// The extent of global voxel coordinates spanned by block `key`.
    #[inline]
    pub fn block_extent(&self, key: Point3i) -> Extent3i {
        Extent3i::from_min_and_shape(self.block_min(key), self.block_shape())
    }

    /// The extent of local voxel coordinates in any block.
    #[inline]
    pub fn local_extent(&self) -> Extent3i {
        Extent3i::from_min_and_shape(Point3i::ZERO, self.block_shape())
    }

    #[inline]
    pub fn global_to_local(&self, voxel: Point3i) -> Point3i {
        voxel.vector_mod_floor(&self.block_shape())
    }

    #[inline]
    pub fn local_to_global(&self, key: Point3i, local: Point3i) -> Point3i {
        self.block_min(key) + local
    }

    /// Row-major (X fastest) index of `local` in a block's voxel array.
    #[inline]
    pub fn linear_index(&self, local: Point3i) -> usize {
        let n = self.block_side;

        (local.x() + n * (local.y() + n * local.z())) as usize
    }

    #[inline]
    pub fn local_from_linear(&self, index: usize) -> Point3i {
        let n = self.block_side as usize;

        PointN([
            (index % n) as i32,
            ((index / n) % n) as i32,
            (index / (n * n)) as i32,
        ])
    }

    /// Returns an iterator over the keys of all blocks that overlap the voxel `extent`.
    #[inline]
    pub fn block_keys_for_extent(&self, extent: &Extent3i) -> impl Iterator<Item = Point3i> {
        Extent3i::from_min_and_max(
            self.block_containing_voxel(extent.minimum),
            self.block_containing_voxel(extent.max()),
        )
        .iter_points()
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn block_keys_for_extent_gives_keys_for_blocks_overlapping_extent() {
        let indexer = BlockIndexer::new(16);
        let query_extent = Extent3i::from_min_and_shape(Point3i::fill(15), Point3i::fill(16));
        let keys: Vec<_> = indexer.block_keys_for_extent(&query_extent).collect();

        assert_eq!(
            keys,
            vec![
                PointN([0, 0, 0]),
                PointN([1, 0, 0]),
                PointN([0, 1, 0]),
                PointN([1, 1, 0]),
                PointN([0, 0, 1]),
                PointN([1, 0, 1]),
                PointN([0, 1, 1]),
                PointN([1, 1, 1])
            ]
        );
    }

    #[test]
    fn block_for_negative_voxel_is_negative() {
        let indexer = BlockIndexer::new(8);
        let p = PointN([-1, 7, 8]);

        assert_eq!(indexer.block_containing_voxel(p), PointN([-1, 0, 1]));
        assert_eq!(indexer.global_to_local(p), PointN([7, 7, 0]));
        assert_eq!(
            indexer.local_to_global(PointN([-1, 0, 1]), PointN([7, 7, 0])),
            p
        );
    }

    #[test]
    fn linear_index_round_trips() {
        let indexer = BlockIndexer::new(4);

        for (i, local) in indexer.local_extent().iter_points().enumerate() {
            assert_eq!(indexer.linear_index(local), i);
            assert_eq!(indexer.local_from_linear(i), local);
        }
        assert_eq!(indexer.voxels_per_block(), 64);
    }
}
