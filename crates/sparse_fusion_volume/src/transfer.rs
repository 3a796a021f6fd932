use crate::{FusionError, FusionResult, ScalableTsdfVolume, TouchReport};

use sparse_fusion_core::Point3i;
use sparse_fusion_storage::{BlockStore, HashEntry, Voxel};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A block's key and a copy of its N³ voxels, in the block's row-major order. This is the unit of saving and restoring
/// a volume; serialize it with any serde format.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VoxelBlock {
    pub key: Point3i,
    pub voxels: Vec<Voxel>,
}

impl ScalableTsdfVolume {
    /// Copies out the blocks in the active block list.
    pub fn download_active_blocks(&self) -> FusionResult<Vec<VoxelBlock>> {
        let state = self.state()?;

        Ok(copy_blocks(&state.store, state.active.entries()))
    }

    /// Copies out every allocated block.
    pub fn download_blocks(&self) -> FusionResult<Vec<VoxelBlock>> {
        let state = self.state()?;
        let entries: Vec<HashEntry> = state.table.iter().collect();

        Ok(copy_blocks(&state.store, &entries))
    }

    /// The keys of the active block list.
    pub fn download_keys(&self) -> FusionResult<Vec<Point3i>> {
        Ok(self
            .state()?
            .active
            .entries()
            .iter()
            .map(|e| e.key)
            .collect())
    }

    /// Allocates the given blocks, leaving existing blocks untouched. Returns each key's address, or `None` where
    /// allocation failed.
    pub fn upload_keys(&mut self, keys: &[Point3i]) -> FusionResult<Vec<Option<u32>>> {
        let (addresses, report) = self.activate_keys(keys)?;
        debug!(requested = report.requested, allocated = report.allocated, "uploaded keys");

        Ok(addresses)
    }

    /// Allocates the given blocks and overwrites their voxels. Every block must hold exactly N³ voxels; otherwise
    /// nothing is written.
    pub fn upload_blocks(&mut self, blocks: &[VoxelBlock]) -> FusionResult<TouchReport> {
        let voxels_per_block = self.state()?.grid.indexer().voxels_per_block();
        if let Some(bad) = blocks.iter().find(|b| b.voxels.len() != voxels_per_block) {
            return Err(FusionError::InvalidInput(format!(
                "block {:?} has {} voxels, expected {}",
                bad.key,
                bad.voxels.len(),
                voxels_per_block
            )));
        }

        let keys: Vec<_> = blocks.iter().map(|b| b.key).collect();
        let (addresses, report) = self.activate_keys(&keys)?;
        let state = self.state_mut()?;
        for (block, address) in blocks.iter().zip(addresses) {
            if let Some(address) = address {
                state.store.write_block(address, &block.voxels)?;
            }
        }
        debug!(
            requested = report.requested,
            allocated = report.allocated,
            "uploaded blocks"
        );

        Ok(report)
    }

    fn activate_keys(&mut self, keys: &[Point3i]) -> FusionResult<(Vec<Option<u32>>, TouchReport)> {
        let state = self.state_mut()?;
        let num_blocks_before = state.table.len();

        let table = &state.table;
        let addresses: Vec<Option<u32>> = keys
            .par_iter()
            .map(|key| table.activate_or_get(*key).ok())
            .collect();
        for &address in state.table.values().allocated_after(num_blocks_before) {
            state.store.initialize(address)?;
        }

        let report = TouchReport {
            requested: keys.len(),
            allocated: state.table.len() - num_blocks_before,
            failed: addresses.iter().filter(|a| a.is_none()).count(),
        };
        if report.is_degraded() {
            warn!(failed = report.failed, "block allocation exhausted");
        }

        Ok((addresses, report))
    }
}

fn copy_blocks(store: &BlockStore, entries: &[HashEntry]) -> Vec<VoxelBlock> {
    entries
        .par_iter()
        .filter_map(|entry| {
            let voxels = store.block(entry.address)?;

            Some(VoxelBlock {
                key: entry.key,
                voxels: voxels.to_vec(),
            })
        })
        .collect()
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
