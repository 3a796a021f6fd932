//! The 3x3x3 block neighborhood used by boundary-aware voxel accessors.
//!
//! Neighbor offsets in `{-1, 0, 1}³` are numbered `(dz + 1) * 9 + (dy + 1) * 3 + (dx + 1)`, the same order as
//! `IntegerPoint::moore_offsets`. The home block is number 13.

use crate::{BlockIndexer, SpatialHashTable};

use sparse_fusion_core::{Point3i, PointN};

pub const NUM_NEIGHBORS: usize = 27;
pub const HOME_NEIGHBOR: usize = 13;

#[inline]
pub fn linearize_neighbor_offset(offset: Point3i) -> usize {
    ((offset.z() + 1) * 9 + (offset.y() + 1) * 3 + (offset.x() + 1)) as usize
}

#[inline]
pub fn neighbor_offset(index: usize) -> Point3i {
    let i = index as i32;

    PointN([i % 3 - 1, (i / 3) % 3 - 1, i / 9 - 1])
}

/// Returns `true` iff `local` touches a face of its block, so that some of its 26 neighboring voxels live in another
/// block.
#[inline]
pub fn on_boundary(local: Point3i, block_side: i32) -> bool {
    local.0.iter().any(|c| *c == 0 || *c == block_side - 1)
}

/// The addresses of a block and its 26 neighbors, resolved once with `find` so that per-voxel queries don't go back to
/// the hash table. Missing neighbors are `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NeighborAddresses {
    home_key: Point3i,
    addresses: [Option<u32>; NUM_NEIGHBORS],
}

impl NeighborAddresses {
    pub fn resolve(table: &SpatialHashTable, home_key: Point3i) -> Self {
        let mut addresses = [None; NUM_NEIGHBORS];
        for (i, address) in addresses.iter_mut().enumerate() {
            *address = table.find(home_key + neighbor_offset(i));
        }

        Self {
            home_key,
            addresses,
        }
    }

    #[inline]
    pub fn home_key(&self) -> Point3i {
        self.home_key
    }

    #[inline]
    pub fn home_address(&self) -> Option<u32> {
        self.addresses[HOME_NEIGHBOR]
    }

    #[inline]
    pub fn get(&self, offset: Point3i) -> Option<u32> {
        if offset.0.iter().any(|c| c.abs() > 1) {
            return None;
        }

        self.addresses[linearize_neighbor_offset(offset)]
    }

    /// Finds the block that holds the voxel at `local`, given in the home block's local coordinates. `local` may reach
    /// one block beyond the home block on every side. Returns the owning block's address and the voxel's coordinates
    /// local to that block.
    #[inline]
    pub fn locate(&self, indexer: &BlockIndexer, local: Point3i) -> Option<(u32, Point3i)> {
        if indexer.local_extent().contains(local) {
            return Some((self.home_address()?, local));
        }

        let offset = indexer.block_containing_voxel(local);

        Some((self.get(offset)?, indexer.global_to_local(local)))
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
