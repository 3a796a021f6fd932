use crate::{FusionError, FusionResult};

use serde::{Deserialize, Serialize};

/// The outcome of one allocation pass. Failed allocations don't abort the pass, they are only counted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TouchReport {
    /// Blocks that the pass asked for, counting repeats.
    pub requested: usize,
    /// Blocks that did not exist before the pass.
    pub allocated: usize,
    /// Requests dropped because a pool was exhausted.
    pub failed: usize,
}

impl TouchReport {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.failed > 0
    }

    /// Turns a degraded pass into an error.
    pub fn check(self) -> FusionResult<Self> {
        if self.is_degraded() {
            Err(FusionError::AllocationExhausted {
                failed: self.failed,
            })
        } else {
            Ok(self)
        }
    }
}

/// The outcome of integrating one frame.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameReport {
    pub touch: TouchReport,
    /// Blocks in the camera frustum that were integrated.
    pub active_blocks: usize,
    /// Voxels that received an observation.
    pub updated_voxels: usize,
}

impl FrameReport {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.touch.is_degraded()
    }

    pub fn check(self) -> FusionResult<Self> {
        self.touch.check()?;

        Ok(self)
    }
}
