use crate::{FusionError, FusionResult, TsdfVolumeConfig, VolumeGrid};

use sparse_fusion_core::{ColorImage, DepthImage, PinholeIntrinsics, Point3i};
use sparse_fusion_storage::{
    ActiveBlocks, BlockIndexer, BlockStore, SpatialHashTable, Voxel,
};

use tracing::info;

/// A TSDF volume of unbounded extent, made of N x N x N voxel blocks that are allocated where depth is observed.
///
/// A volume is created empty; `create` allocates its storage with fixed capacities. Every frame then goes through
/// the passes `touch` (allocate blocks near observed surfaces), `compact_*` (list the blocks to work on) and
/// `integrate_active` (update voxels), which `integrate` runs in order. Ray casting and rendering only read.
#[derive(Clone, Debug, Default)]
pub struct ScalableTsdfVolume {
    config: TsdfVolumeConfig,
    state: Option<VolumeState>,
}

#[derive(Clone, Debug)]
pub(crate) struct VolumeState {
    pub grid: VolumeGrid,
    pub table: SpatialHashTable,
    pub store: BlockStore,
    pub active: ActiveBlocks,
}

impl ScalableTsdfVolume {
    /// A volume without storage. Call `create` before using it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `new` followed by `create`.
    pub fn with_config(config: TsdfVolumeConfig) -> FusionResult<Self> {
        let mut volume = Self::new();
        volume.create(config)?;

        Ok(volume)
    }

    /// Validates `config` and allocates the hash table, the value pool and the active block list.
    pub fn create(&mut self, config: TsdfVolumeConfig) -> FusionResult<()> {
        if self.state.is_some() {
            return Err(FusionError::AlreadyCreated);
        }
        config.validate()?;

        let indexer = BlockIndexer::new(config.block_side);
        let table = SpatialHashTable::new(
            config.bucket_count,
            config.value_capacity,
            config.chain_capacity,
        )?;
        self.state = Some(VolumeState {
            grid: VolumeGrid::new(indexer, config.voxel_length, config.volume_to_world),
            table,
            store: BlockStore::new(indexer, config.value_capacity),
            active: ActiveBlocks::new(config.value_capacity),
        });
        info!(
            block_side = config.block_side,
            voxel_length = config.voxel_length as f64,
            bucket_count = config.bucket_count,
            value_capacity = config.value_capacity,
            "created TSDF volume"
        );
        self.config = config;

        Ok(())
    }

    /// Drops every block but keeps the storage allocated. Blocks allocated afterwards start out unobserved, whichever
    /// way they are allocated.
    pub fn reset(&mut self) -> FusionResult<()> {
        let state = self.state_mut()?;
        state.table.reset();
        state.store.clear();
        state.active.clear();
        info!("reset TSDF volume");

        Ok(())
    }

    /// Frees all storage. The volume can be created again afterwards.
    pub fn release(&mut self) {
        if self.state.take().is_some() {
            info!("released TSDF volume");
        }
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        self.state.is_some()
    }

    #[inline]
    pub fn config(&self) -> &TsdfVolumeConfig {
        &self.config
    }

    pub fn grid(&self) -> FusionResult<&VolumeGrid> {
        Ok(&self.state()?.grid)
    }

    pub fn hash_table(&self) -> FusionResult<&SpatialHashTable> {
        Ok(&self.state()?.table)
    }

    pub fn block_store(&self) -> FusionResult<&BlockStore> {
        Ok(&self.state()?.store)
    }

    pub fn active_blocks(&self) -> FusionResult<&ActiveBlocks> {
        Ok(&self.state()?.active)
    }

    /// The number of allocated blocks.
    pub fn num_blocks(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.table.len())
    }

    /// The voxels of block `key`, if it is allocated.
    pub fn block(&self, key: Point3i) -> FusionResult<Option<&[Voxel]>> {
        let state = self.state()?;

        Ok(state
            .table
            .find(key)
            .and_then(|address| state.store.block(address)))
    }

    /// The voxel at global voxel coordinates `voxel`, if its block is allocated.
    pub fn voxel(&self, voxel: Point3i) -> FusionResult<Option<Voxel>> {
        let state = self.state()?;
        let indexer = state.grid.indexer();

        Ok(state
            .table
            .find(indexer.block_containing_voxel(voxel))
            .and_then(|address| state.store.voxel(address, indexer.global_to_local(voxel)))
            .copied())
    }

    pub(crate) fn state(&self) -> FusionResult<&VolumeState> {
        self.state.as_ref().ok_or(FusionError::NotCreated)
    }

    pub(crate) fn state_mut(&mut self) -> FusionResult<&mut VolumeState> {
        self.state.as_mut().ok_or(FusionError::NotCreated)
    }

    /// Rejects frames whose images don't match the camera, or that lack a color image when colors are integrated.
    pub(crate) fn check_frame(
        &self,
        depth: &DepthImage,
        color: Option<&ColorImage>,
        intrinsics: &PinholeIntrinsics,
    ) -> FusionResult<()> {
        self.state()?;
        check_image_shape("depth", depth.width(), depth.height(), intrinsics)?;
        match color {
            Some(color) => check_image_shape("color", color.width(), color.height(), intrinsics),
            None if self.config.integrate_color => Err(FusionError::InvalidInput(
                "color integration is enabled but no color image was given".to_string(),
            )),
            None => Ok(()),
        }
    }
}

pub(crate) fn check_image_shape(
    name: &str,
    width: usize,
    height: usize,
    intrinsics: &PinholeIntrinsics,
) -> FusionResult<()> {
    if width != intrinsics.width || height != intrinsics.height {
        return Err(FusionError::InvalidInput(format!(
            "{} image is {}x{} but the camera is {}x{}",
            name, width, height, intrinsics.width, intrinsics.height
        )));
    }

    Ok(())
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
