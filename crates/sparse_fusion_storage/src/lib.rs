//! Storage and indexing for sparse voxel blocks that many threads fill at once.
//!
//! The pieces, leaves first:
//!   - `SlotAllocator` and `MemoryPool`: fixed-capacity slot allocation with a lock-free free stack
//!   - `AppendBuffer`: fixed-capacity array with lock-free parallel append
//!   - `SpatialHashTable`: concurrent map from block keys to value pool addresses, with overflow chains
//!   - `BlockStore`: the `Voxel` payload of every value pool slot
//!   - `ActiveBlocks`: a dense, duplicate-free list of table entries with a reverse index
//!   - `NeighborAddresses`: the 27 block addresses around a block, for queries that cross block faces
//!
//! Everything is arena-and-index. References between structures are integer slot indices, never pointers.

pub mod active_blocks;
pub mod append_buffer;
pub mod block_store;
pub mod chain;
pub mod error;
pub mod hash_table;
pub mod indexer;
pub mod memory_pool;
pub mod neighbors;

pub use active_blocks::ActiveBlocks;
pub use append_buffer::{AppendBuffer, Appender};
pub use block_store::{BlockStore, Voxel};
pub use chain::{EntrySlot, SlotState, NULL_INDEX};
pub use error::{ExhaustedResource, StorageError, StorageResult};
pub use hash_table::{hash_block_key, BucketEntries, HashEntry, SpatialHashTable};
pub use indexer::BlockIndexer;
pub use memory_pool::{MemoryPool, SlotAllocator};
pub use neighbors::{
    linearize_neighbor_offset, neighbor_offset, on_boundary, NeighborAddresses, HOME_NEIGHBOR,
    NUM_NEIGHBORS,
};

// Hash types to use for small keys like `PointN`.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyHashSet<K> = ahash::AHashSet<K>;

pub mod prelude {
    pub use super::{
        ActiveBlocks, AppendBuffer, BlockIndexer, BlockStore, HashEntry, MemoryPool,
        NeighborAddresses, SlotAllocator, SmallKeyHashMap, SmallKeyHashSet, SpatialHashTable,
        StorageError, Voxel,
    };
}
