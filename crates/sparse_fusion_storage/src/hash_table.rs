//! A concurrent map from block keys to value pool addresses.
//!
//! Inserts (`activate_or_get`) and lookups (`find`) may run from any number of threads through a shared reference.
//! Entries are never removed or moved once committed, so a lookup never needs to synchronize with anything but the
//! commit of the entry it finds. The only way to remove entries is `reset`, which takes `&mut self`.
//!
//! # Example
//! ```
//! # use sparse_fusion_core::prelude::*;
//! # use sparse_fusion_storage::SpatialHashTable;
//! let table = SpatialHashTable::new(64, 16, 16).unwrap();
//! let a = table.activate_or_get(PointN([1, 2, 3])).unwrap();
//!
//! assert_eq!(table.activate_or_get(PointN([1, 2, 3])), Ok(a));
//! assert_eq!(table.find(PointN([1, 2, 3])), Some(a));
//! assert_eq!(table.find(PointN([3, 2, 1])), None);
//! ```

use crate::{
    chain::{EntrySlot, SlotState, NULL_INDEX},
    ExhaustedResource, MemoryPool, SlotAllocator, StorageError, StorageResult,
};

use sparse_fusion_core::Point3i;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const HASH_PRIMES: [i32; 3] = [73_856_093, 19_349_663, 83_492_791];

/// Busy-wait steps that spin before falling back to yielding the thread.
const SPIN_STEPS: u32 = 6;
/// Total wait steps before an insert gives up on a slot that stays reserved.
const MAX_WAIT_STEPS: u32 = 1 << 16;

/// A committed key-address pair.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct HashEntry {
    pub key: Point3i,
    pub address: u32,
}

/// Mixes the three key components so that axis-aligned neighbors land in different buckets.
#[inline]
pub fn hash_block_key(key: Point3i, bucket_count: usize) -> usize {
    let h = key.x().wrapping_mul(HASH_PRIMES[0])
        ^ key.y().wrapping_mul(HASH_PRIMES[1])
        ^ key.z().wrapping_mul(HASH_PRIMES[2]);

    (h as i64).rem_euclid(bucket_count as i64) as usize
}

#[derive(Clone, Debug)]
pub struct SpatialHashTable {
    heads: Vec<EntrySlot>,
    chains: MemoryPool<EntrySlot>,
    values: SlotAllocator,
}

impl SpatialHashTable {
    pub fn new(
        bucket_count: usize,
        value_capacity: usize,
        chain_capacity: usize,
    ) -> StorageResult<Self> {
        for (name, capacity) in [
            ("bucket_count", bucket_count),
            ("value_capacity", value_capacity),
            ("chain_capacity", chain_capacity),
        ]
        .iter()
        {
            if *capacity == 0 || *capacity >= NULL_INDEX as usize {
                return Err(StorageError::InvalidConfiguration(format!(
                    "{} must be in 1..{}, got {}",
                    name, NULL_INDEX, capacity
                )));
            }
        }

        let mut heads = Vec::with_capacity(bucket_count);
        heads.resize_with(bucket_count, EntrySlot::default);

        Ok(Self {
            heads,
            chains: MemoryPool::new(chain_capacity),
            values: SlotAllocator::new(value_capacity),
        })
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    pub fn value_capacity(&self) -> usize {
        self.values.capacity()
    }

    #[inline]
    pub fn chain_capacity(&self) -> usize {
        self.chains.capacity()
    }

    /// The number of committed entries, which is also the number of value slots in use.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.num_allocated()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn num_chain_nodes(&self) -> usize {
        self.chains.num_allocated()
    }

    /// The value pool. Use `SlotAllocator::allocated_after` to find the addresses handed out by a pass of inserts.
    #[inline]
    pub fn values(&self) -> &SlotAllocator {
        &self.values
    }

    #[inline]
    pub fn bucket_of(&self, key: Point3i) -> usize {
        hash_block_key(key, self.bucket_count())
    }

    /// Returns the address of `key`, inserting it with a newly allocated address if it is not already present.
    ///
    /// Concurrent calls with the same key all return the same address, and only one of them allocates. If the value
    /// pool or the chain pool is exhausted, no entry is added. A chain node that loses the race to be linked goes back to
    /// the chain pool, so chain nodes in use never outnumber committed chain entries plus abandoned ones.
    pub fn activate_or_get(&self, key: Point3i) -> StorageResult<u32> {
        let head = &self.heads[self.bucket_of(key)];

        let mut backoff = Backoff::default();
        loop {
            match head.state() {
                SlotState::Empty => {
                    if head.try_reserve() {
                        head.store_key(key);
                        return self.commit_new_value(head);
                    }
                }
                // The key of a reserved head is not published yet, so we can't tell if it's ours.
                SlotState::Reserved => backoff.snooze(key)?,
                SlotState::Committed => {
                    if head.key() == key {
                        return Ok(head.address());
                    }
                    break;
                }
            }
        }

        self.activate_in_chain(head, key)
    }

    fn activate_in_chain(&self, head: &EntrySlot, key: Point3i) -> StorageResult<u32> {
        // A node we allocated but failed to link. It gets another try at the next end of chain, and goes back to the
        // pool if the key shows up first.
        let mut spare = None;
        let result = self.find_or_link(head, key, &mut spare);
        if let Some(index) = spare {
            self.chains.recycle(index)?;
        }

        result
    }

    fn find_or_link(
        &self,
        head: &EntrySlot,
        key: Point3i,
        spare: &mut Option<u32>,
    ) -> StorageResult<u32> {
        let mut tail = head;
        loop {
            let next = tail.next();
            if next == NULL_INDEX {
                let node_index = match spare.take() {
                    Some(index) => index,
                    None => self
                        .chains
                        .allocate()
                        .map_err(|_| StorageError::AllocationExhausted {
                            resource: ExhaustedResource::ChainPool,
                        })?,
                };
                let node = self.node(node_index)?;
                node.prepare_node(key);
                match tail.link(node_index) {
                    Ok(()) => return self.commit_new_value(node),
                    Err(_) => {
                        *spare = Some(node_index);
                        continue;
                    }
                }
            }

            let node = self.node(next)?;
            let mut backoff = Backoff::default();
            loop {
                // Chain node keys are written before the node is linked, so they can be compared while reserved.
                match node.state() {
                    SlotState::Empty => break,
                    SlotState::Reserved if node.key() == key => backoff.snooze(key)?,
                    SlotState::Committed if node.key() == key => return Ok(node.address()),
                    _ => break,
                }
            }
            tail = node;
        }
    }

    fn commit_new_value(&self, slot: &EntrySlot) -> StorageResult<u32> {
        match self.values.allocate() {
            Ok(address) => {
                slot.commit(address);

                Ok(address)
            }
            Err(_) => {
                slot.abandon();

                Err(StorageError::AllocationExhausted {
                    resource: ExhaustedResource::ValuePool,
                })
            }
        }
    }

    #[inline]
    fn node(&self, index: u32) -> StorageResult<&EntrySlot> {
        self.chains.get(index).ok_or(StorageError::OutOfBounds {
            index: index as usize,
            len: self.chains.capacity(),
        })
    }

    /// Returns the address of `key` if it has been committed. Never allocates or waits.
    #[inline]
    pub fn find(&self, key: Point3i) -> Option<u32> {
        self.bucket_entries(self.bucket_of(key))
            .find(|entry| entry.key == key)
            .map(|entry| entry.address)
    }

    /// Iterates over the committed entries of one bucket, head first.
    #[inline]
    pub fn bucket_entries(&self, bucket: usize) -> BucketEntries<'_> {
        BucketEntries {
            table: self,
            slot: self.heads.get(bucket),
        }
    }

    /// Iterates over all committed entries, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = HashEntry> + '_ {
        (0..self.bucket_count()).flat_map(move |bucket| self.bucket_entries(bucket))
    }

    /// Calls `f` on every committed entry, with buckets processed in parallel.
    pub fn par_for_each_entry(&self, f: impl Fn(HashEntry) + Send + Sync) {
        (0..self.bucket_count())
            .into_par_iter()
            .for_each(|bucket| self.bucket_entries(bucket).for_each(&f));
    }

    /// Removes every entry and frees every slot.
    pub fn reset(&mut self) {
        for head in self.heads.iter_mut() {
            head.clear();
        }
        self.chains.reset();
        self.values.reset();
    }
}

/// Committed entries of one bucket, following the overflow chain.
pub struct BucketEntries<'a> {
    table: &'a SpatialHashTable,
    slot: Option<&'a EntrySlot>,
}

impl<'a> Iterator for BucketEntries<'a> {
    type Item = HashEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(slot) = self.slot {
            let next = slot.next();
            self.slot = if next == NULL_INDEX {
                None
            } else {
                self.table.chains.get(next)
            };

            if let Some(entry) = slot.committed_entry() {
                return Some(entry);
            }
        }

        None
    }
}

/// Bounded wait on a reserved slot.
#[derive(Default)]
struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    fn snooze(&mut self, key: Point3i) -> StorageResult<()> {
        if self.step >= MAX_WAIT_STEPS {
            return Err(StorageError::Contended { key });
        }
        if self.step < SPIN_STEPS {
            for _ in 0..(1 << self.step) {
                std::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        self.step += 1;

        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{SmallKeyHashMap, SmallKeyHashSet};

    use pretty_assertions::assert_eq;
    use rand::prelude::*;
    use sparse_fusion_core::PointN;

    fn random_keys(n: usize, seed: u64) -> Vec<Point3i> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut keys: Vec<Point3i> = (0..n)
            .map(|_| {
                PointN([
                    rng.gen_range(-50..50),
                    rng.gen_range(-50..50),
                    rng.gen_range(-50..50),
                ])
            })
            .collect();
        keys.sort_by_key(|k| k.0);
        keys.dedup();

        keys
    }

    #[test]
    fn hash_is_in_range_for_negative_keys() {
        for key in random_keys(1000, 1) {
            assert!(hash_block_key(key, 97) < 97);
        }
        assert_eq!(hash_block_key(PointN([0, 0, 0]), 10), 0);
    }

    #[test]
    fn find_returns_inserted_address_every_time() {
        // Few buckets so that most keys land in overflow chains.
        let keys = random_keys(2000, 2);
        let table = SpatialHashTable::new(31, keys.len(), keys.len()).unwrap();

        let addresses: Vec<u32> = keys
            .iter()
            .map(|k| table.activate_or_get(*k).unwrap())
            .collect();

        assert_eq!(table.len(), keys.len());
        for (key, address) in keys.iter().zip(addresses.iter()) {
            assert_eq!(table.find(*key), Some(*address));
            assert_eq!(table.find(*key), Some(*address));
            assert_eq!(table.activate_or_get(*key), Ok(*address));
        }
        assert_eq!(table.len(), keys.len());
    }

    #[test]
    fn concurrent_same_key_inserts_consume_one_slot() {
        let table = SpatialHashTable::new(8, 16, 16).unwrap();
        let key = PointN([4, 5, 6]);

        let addresses: Vec<u32> = (0..10_000)
            .into_par_iter()
            .map(|_| table.activate_or_get(key).unwrap())
            .collect();

        assert!(addresses.iter().all(|a| *a == addresses[0]));
        assert_eq!(table.len(), 1);
        assert_eq!(table.values().num_allocated(), 1);
    }

    #[test]
    fn concurrent_colliding_inserts_have_no_duplicates() {
        let keys = random_keys(3000, 3);
        // Each thread holds at most one unlinked chain node at a time.
        let chain_capacity = keys.len() + rayon::current_num_threads();
        let table = SpatialHashTable::new(7, keys.len(), chain_capacity).unwrap();

        // Every key is inserted by four racing tasks.
        let results: Vec<(Point3i, u32)> = (0..4 * keys.len())
            .into_par_iter()
            .map(|i| keys[i / 4])
            .map(|k| (k, table.activate_or_get(k).unwrap()))
            .collect();

        let mut by_key = SmallKeyHashMap::default();
        for (key, address) in results {
            let first = *by_key.entry(key).or_insert(address);
            assert_eq!(first, address);
        }
        assert_eq!(by_key.len(), keys.len());
        assert_eq!(table.len(), keys.len());

        let mut entry_keys: Vec<Point3i> = table.iter().map(|e| e.key).collect();
        entry_keys.sort_by_key(|k| k.0);
        assert_eq!(entry_keys, keys);
    }

    #[test]
    fn chain_nodes_that_lose_a_link_race_are_reused() {
        let keys = random_keys(2000, 7);
        // Room for the linked nodes plus one in flight per thread, but not for nodes that are never given back.
        let chain_capacity = keys.len() + rayon::current_num_threads();
        let table = SpatialHashTable::new(5, keys.len(), chain_capacity).unwrap();

        // Eight tasks race on each key, all in the same few chains.
        (0..8 * keys.len())
            .into_par_iter()
            .map(|i| keys[i / 8])
            .for_each(|k| {
                table.activate_or_get(k).unwrap();
            });

        let used_buckets: SmallKeyHashSet<usize> =
            keys.iter().map(|k| table.bucket_of(*k)).collect();
        assert_eq!(table.len(), keys.len());
        assert_eq!(table.num_chain_nodes(), keys.len() - used_buckets.len());

        for key in keys.iter() {
            assert!(table.find(*key).is_some());
        }
    }

    #[test]
    fn exhaustion_is_reported_without_corrupting_entries() {
        let table = SpatialHashTable::new(4, 3, 2).unwrap();
        let keys = random_keys(20, 4);

        let mut inserted = Vec::new();
        let mut failures = 0;
        for key in keys.iter() {
            match table.activate_or_get(*key) {
                Ok(address) => inserted.push((*key, address)),
                Err(StorageError::AllocationExhausted { .. }) => failures += 1,
                Err(e) => panic!("unexpected error {:?}", e),
            }
        }

        assert_eq!(inserted.len(), 3);
        assert_eq!(failures, keys.len() - 3);
        for (key, address) in inserted {
            assert_eq!(table.find(key), Some(address));
        }
        assert_eq!(table.iter().count(), 3);
    }

    #[test]
    fn par_for_each_visits_every_entry_once() {
        let keys = random_keys(500, 5);
        let table = SpatialHashTable::new(13, keys.len(), keys.len()).unwrap();
        for key in keys.iter() {
            table.activate_or_get(*key).unwrap();
        }

        let visited = std::sync::Mutex::new(Vec::new());
        table.par_for_each_entry(|entry| visited.lock().unwrap().push(entry.key));

        let mut visited = visited.into_inner().unwrap();
        visited.sort_by_key(|k| k.0);
        assert_eq!(visited, keys);
    }

    #[test]
    fn reset_empties_table() {
        let mut table = SpatialHashTable::new(4, 8, 8).unwrap();
        for key in random_keys(8, 6) {
            table.activate_or_get(key).unwrap();
        }

        table.reset();

        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
        assert_eq!(table.num_chain_nodes(), 0);
        assert_eq!(table.activate_or_get(PointN([0, 0, 0])), Ok(0));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        assert!(matches!(
            SpatialHashTable::new(0, 1, 1),
            Err(StorageError::InvalidConfiguration(_))
        ));
    }
}
