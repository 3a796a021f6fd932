use crate::{FusionError, FusionResult};

use sparse_fusion_core::RigidTransform;

use serde::{Deserialize, Serialize};

/// Depths outside of `[min, max]` meters are ignored by every pass.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, depth: f32) -> bool {
        self.min <= depth && depth <= self.max
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::new(0.1, 3.5)
    }
}

/// The most voxels a volume may store, over all blocks. At 8 bytes per voxel this is 32 GiB.
pub const MAX_STORED_VOXELS: u64 = 1 << 32;

/// Everything that is fixed when a `ScalableTsdfVolume` is created.
///
/// ```
/// # use sparse_fusion_volume::TsdfVolumeConfig;
/// let config = TsdfVolumeConfig::default()
///     .with_voxel_length(0.005)
///     .with_sdf_trunc(0.02)
///     .with_value_capacity(10_000);
/// assert!(config.validate().is_ok());
/// assert!(config.with_bucket_count(0).validate().is_err());
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TsdfVolumeConfig {
    /// Voxels along each side of a block.
    pub block_side: i32,
    /// Side length of a voxel in meters.
    pub voxel_length: f32,
    /// Truncation distance in meters.
    pub sdf_trunc: f32,
    pub bucket_count: usize,
    /// Maximum number of blocks.
    pub value_capacity: usize,
    /// Maximum number of overflow chain nodes.
    pub chain_capacity: usize,
    /// Voxel weights saturate here.
    pub max_weight: u8,
    pub depth_range: DepthRange,
    /// Whether `integrate` blends colors. If set, every frame needs a color image.
    pub integrate_color: bool,
    pub volume_to_world: RigidTransform,
}

impl Default for TsdfVolumeConfig {
    fn default() -> Self {
        let voxel_length = 0.01;

        Self {
            block_side: 8,
            voxel_length,
            sdf_trunc: 3.0 * voxel_length,
            bucket_count: 20_000,
            value_capacity: 400_000,
            chain_capacity: 400_000,
            max_weight: u8::MAX,
            depth_range: DepthRange::default(),
            integrate_color: true,
            volume_to_world: RigidTransform::identity(),
        }
    }
}

impl TsdfVolumeConfig {
    pub fn with_block_side(mut self, block_side: i32) -> Self {
        self.block_side = block_side;
        self
    }

    pub fn with_voxel_length(mut self, voxel_length: f32) -> Self {
        self.voxel_length = voxel_length;
        self
    }

    pub fn with_sdf_trunc(mut self, sdf_trunc: f32) -> Self {
        self.sdf_trunc = sdf_trunc;
        self
    }

    pub fn with_bucket_count(mut self, bucket_count: usize) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    /// Also sets the chain capacity to match.
    pub fn with_value_capacity(mut self, value_capacity: usize) -> Self {
        self.value_capacity = value_capacity;
        self.chain_capacity = value_capacity;
        self
    }

    pub fn with_chain_capacity(mut self, chain_capacity: usize) -> Self {
        self.chain_capacity = chain_capacity;
        self
    }

    pub fn with_max_weight(mut self, max_weight: u8) -> Self {
        self.max_weight = max_weight;
        self
    }

    pub fn with_depth_range(mut self, min: f32, max: f32) -> Self {
        self.depth_range = DepthRange::new(min, max);
        self
    }

    pub fn with_color(mut self, integrate_color: bool) -> Self {
        self.integrate_color = integrate_color;
        self
    }

    pub fn with_volume_to_world(mut self, volume_to_world: RigidTransform) -> Self {
        self.volume_to_world = volume_to_world;
        self
    }

    /// The block edge length in meters.
    pub fn block_length(&self) -> f32 {
        self.block_side as f32 * self.voxel_length
    }

    pub fn validate(&self) -> FusionResult<()> {
        fn invalid(message: String) -> FusionResult<()> {
            Err(FusionError::Configuration(message))
        }

        // Local voxel indices must fit in an i32 linear index.
        if self.block_side <= 0 || self.block_side > 1024 {
            return invalid(format!("block_side must be in 1..=1024, got {}", self.block_side));
        }
        if !(self.voxel_length.is_finite() && self.voxel_length > 0.0) {
            return invalid(format!(
                "voxel_length must be positive, got {}",
                self.voxel_length
            ));
        }
        if !(self.sdf_trunc.is_finite() && self.sdf_trunc > 0.0) {
            return invalid(format!("sdf_trunc must be positive, got {}", self.sdf_trunc));
        }
        for (name, capacity) in [
            ("bucket_count", self.bucket_count),
            ("value_capacity", self.value_capacity),
            ("chain_capacity", self.chain_capacity),
        ]
        .iter()
        {
            if *capacity == 0 || *capacity >= u32::MAX as usize {
                return invalid(format!("{} must be positive, got {}", name, capacity));
            }
        }
        // `create` allocates the whole block store up front.
        let voxels_per_block = (self.block_side as u64).pow(3);
        let stored_voxels = (self.value_capacity as u64).checked_mul(voxels_per_block);
        match stored_voxels {
            Some(n) if n <= MAX_STORED_VOXELS && n <= usize::MAX as u64 => (),
            _ => {
                return invalid(format!(
                    "value_capacity {} of {}^3 voxel blocks exceeds {} voxels",
                    self.value_capacity, self.block_side, MAX_STORED_VOXELS
                ))
            }
        }
        if self.max_weight == 0 {
            return invalid("max_weight must be positive".to_string());
        }
        let DepthRange { min, max } = self.depth_range;
        if !(min.is_finite() && max.is_finite() && 0.0 <= min && min < max) {
            return invalid(format!("invalid depth range [{}, {}]", min, max));
        }

        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
