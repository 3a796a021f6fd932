use crate::{BlockIndexer, StorageError, StorageResult};

use sparse_fusion_core::{Point3i, Rgb};

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One TSDF sample.
///
/// `tsdf` is the signed distance to the nearest surface divided by the truncation distance, so it lies in `[-1, 1]`.
/// A voxel with zero weight has never been observed and its other fields are meaningless.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Pod, Serialize, Zeroable)]
#[repr(C)]
pub struct Voxel {
    pub tsdf: f32,
    pub color: Rgb,
    pub weight: u8,
}

impl Voxel {
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0
    }
}

/// Voxel payloads for every value pool slot, stored contiguously in slot order. Block `address` owns voxels
/// `[address * N³, (address + 1) * N³)`, laid out row-major within the block.
#[derive(Clone, Debug)]
pub struct BlockStore {
    indexer: BlockIndexer,
    voxels: Vec<Voxel>,
}

impl BlockStore {
    pub fn new(indexer: BlockIndexer, capacity: usize) -> Self {
        Self {
            indexer,
            voxels: vec![Voxel::default(); capacity * indexer.voxels_per_block()],
        }
    }

    #[inline]
    pub fn indexer(&self) -> &BlockIndexer {
        &self.indexer
    }

    /// The number of blocks that fit in the store.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.voxels.len() / self.indexer.voxels_per_block()
    }

    #[inline]
    pub fn block(&self, address: u32) -> Option<&[Voxel]> {
        let n = self.indexer.voxels_per_block();
        let start = address as usize * n;

        self.voxels.get(start..start + n)
    }

    #[inline]
    pub fn block_mut(&mut self, address: u32) -> Option<&mut [Voxel]> {
        let n = self.indexer.voxels_per_block();
        let start = address as usize * n;

        self.voxels.get_mut(start..start + n)
    }

    #[inline]
    pub fn voxel(&self, address: u32, local: Point3i) -> Option<&Voxel> {
        self.block(address)?.get(self.indexer.linear_index(local))
    }

    /// The raw bytes of a block, e.g. for hashing or compressing it.
    pub fn block_bytes(&self, address: u32) -> Option<&[u8]> {
        self.block(address).map(bytemuck::cast_slice)
    }

    /// Resets a block to the unobserved state.
    pub fn initialize(&mut self, address: u32) -> StorageResult<()> {
        let capacity = self.capacity();
        let block = self
            .block_mut(address)
            .ok_or(StorageError::OutOfBounds {
                index: address as usize,
                len: capacity,
            })?;
        for voxel in block.iter_mut() {
            *voxel = Voxel::default();
        }

        Ok(())
    }

    /// Resets every block to the unobserved state.
    pub fn clear(&mut self) {
        self.voxels
            .par_iter_mut()
            .for_each(|voxel| *voxel = Voxel::default());
    }

    /// Overwrites a block with `voxels`, which must hold exactly N³ samples.
    pub fn write_block(&mut self, address: u32, voxels: &[Voxel]) -> StorageResult<()> {
        let capacity = self.capacity();
        let n = self.indexer.voxels_per_block();
        if voxels.len() != n {
            return Err(StorageError::OutOfBounds {
                index: voxels.len(),
                len: n,
            });
        }
        let block = self
            .block_mut(address)
            .ok_or(StorageError::OutOfBounds {
                index: address as usize,
                len: capacity,
            })?;
        block.copy_from_slice(voxels);

        Ok(())
    }

    /// Every block as a mutable slice, indexed by address, for processing in parallel.
    pub fn par_blocks_mut(&mut self) -> rayon::slice::ChunksMut<'_, Voxel> {
        let n = self.indexer.voxels_per_block();

        self.voxels.par_chunks_mut(n)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
