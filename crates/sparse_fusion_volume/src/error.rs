use sparse_fusion_storage::StorageError;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("volume has already been created")]
    AlreadyCreated,

    #[error("volume has not been created")]
    NotCreated,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{failed} block allocations failed")]
    AllocationExhausted { failed: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FusionResult<T> = Result<T, FusionError>;
