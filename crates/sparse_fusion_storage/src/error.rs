use sparse_fusion_core::Point3i;

use std::fmt;
use thiserror::Error;

/// Which fixed-capacity pool ran dry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExhaustedResource {
    /// Voxel block payload slots.
    ValuePool,
    /// Overflow chain nodes.
    ChainPool,
}

impl fmt::Display for ExhaustedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedResource::ValuePool => write!(f, "value pool"),
            ExhaustedResource::ChainPool => write!(f, "overflow chain pool"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("memory pool is full (capacity {capacity})")]
    PoolFull { capacity: usize },

    #[error("append buffer is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("index {index} is out of bounds (length {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("{resource} exhausted")]
    AllocationExhausted { resource: ExhaustedResource },

    #[error("gave up waiting for a concurrent insertion of block {key:?}")]
    Contended { key: Point3i },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
