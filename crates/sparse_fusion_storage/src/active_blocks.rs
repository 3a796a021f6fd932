use crate::{AppendBuffer, HashEntry, SpatialHashTable, StorageError, StorageResult};

use sparse_fusion_core::Point3i;

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

const NOT_ACTIVE: i32 = -1;

/// A dense, duplicate-free list of the hash table entries that one pass operates on, plus the reverse index from value
/// address to list position.
///
/// The list is rebuilt from the table by `compact`, never from the inserts that created the entries. Inserts race and
/// repeat keys, while every committed entry appears exactly once in the table.
#[derive(Debug)]
pub struct ActiveBlocks {
    entries: AppendBuffer<HashEntry>,
    positions: Vec<AtomicI32>,
}

impl ActiveBlocks {
    /// `value_capacity` bounds both the list length and the addresses in the reverse index.
    pub fn new(value_capacity: usize) -> Self {
        let mut positions = Vec::with_capacity(value_capacity);
        positions.resize_with(value_capacity, || AtomicI32::new(NOT_ACTIVE));

        Self {
            entries: AppendBuffer::new(value_capacity),
            positions,
        }
    }

    /// Replaces the list with every entry of `table` whose key passes `filter`. Buckets are visited in parallel, so the
    /// order of the list is unspecified.
    pub fn compact(
        &mut self,
        table: &SpatialHashTable,
        filter: impl Fn(Point3i) -> bool + Send + Sync,
    ) -> StorageResult<usize> {
        self.clear();

        let dropped = AtomicUsize::new(0);
        {
            let Self { entries, positions } = self;
            let appender = entries.appender();
            table.par_for_each_entry(|entry| {
                if !filter(entry.key) {
                    return;
                }
                match appender.append(entry) {
                    Ok(position) => {
                        if let Some(slot) = positions.get(entry.address as usize) {
                            slot.store(position as i32, Ordering::Relaxed);
                        }
                    }
                    Err(_) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }

        if dropped.into_inner() > 0 {
            return Err(StorageError::CapacityExceeded {
                capacity: self.entries.capacity(),
            });
        }

        Ok(self.len())
    }

    /// Empties the list. Only the reverse index entries of the current list are touched.
    pub fn clear(&mut self) {
        let Self { entries, positions } = self;
        for entry in entries.as_slice() {
            if let Some(slot) = positions.get_mut(entry.address as usize) {
                *slot.get_mut() = NOT_ACTIVE;
            }
        }
        entries.reset_count();
    }

    #[inline]
    pub fn entries(&self) -> &[HashEntry] {
        self.entries.as_slice()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The list position of the block stored at `address`, if it is active.
    #[inline]
    pub fn position(&self, address: u32) -> Option<usize> {
        let position = self.positions.get(address as usize)?.load(Ordering::Relaxed);

        if position == NOT_ACTIVE {
            None
        } else {
            Some(position as usize)
        }
    }

    /// The list position of block `key`, if it is active.
    #[inline]
    pub fn position_of_key(&self, table: &SpatialHashTable, key: Point3i) -> Option<usize> {
        self.position(table.find(key)?)
    }
}

impl Clone for ActiveBlocks {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            positions: self
                .positions
                .iter()
                .map(|p| AtomicI32::new(p.load(Ordering::Relaxed)))
                .collect(),
        }
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

    use pretty_assertions::assert_eq;
    use rayon::prelude::*;
    use sparse_fusion_core::{Extent3i, PointN};

    fn filled_table() -> SpatialHashTable {
        let table = SpatialHashTable::new(5, 64, 64).unwrap();
        let extent = Extent3i::from_min_and_shape(PointN([-2, -2, -2]), PointN([4, 4, 4]));
        // Every key is inserted many times over, like overlapping pixel rays do.
        extent
            .iter_points()
            .collect::<Vec<_>>()
            .par_iter()
            .for_each(|k| {
                for _ in 0..8 {
                    table.activate_or_get(*k).unwrap();
                }
            });

        table
    }

    fn sorted_keys(active: &ActiveBlocks) -> Vec<Point3i> {
        let mut keys: Vec<_> = active.entries().iter().map(|e| e.key).collect();
        keys.sort_by_key(|k| k.0);

        keys
    }

    #[test]
    fn compaction_is_unique_and_indexed() {
        let table = filled_table();
        let mut active = ActiveBlocks::new(table.value_capacity());

        let n = active.compact(&table, |k| k.z() >= 0).unwrap();

        assert_eq!(n, 32);
        let keys = sorted_keys(&active);
        let mut deduped = keys.clone();
        deduped.dedup();
        assert_eq!(keys, deduped);
        for (i, entry) in active.entries().iter().enumerate() {
            assert_eq!(active.position(entry.address), Some(i));
            assert_eq!(active.position_of_key(&table, entry.key), Some(i));
        }
        assert_eq!(active.position_of_key(&table, PointN([0, 0, -1])), None);
    }

    #[test]
    fn compaction_twice_gives_same_set() {
        let table = filled_table();
        let mut active = ActiveBlocks::new(table.value_capacity());

        active.compact(&table, |_| true).unwrap();
        let first = sorted_keys(&active);
        active.compact(&table, |_| true).unwrap();
        let second = sorted_keys(&active);

        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
    }

    #[test]
    fn clear_resets_reverse_index() {
        let table = filled_table();
        let mut active = ActiveBlocks::new(table.value_capacity());
        active.compact(&table, |_| true).unwrap();
        let address = active.entries()[0].address;

        active.compact(&table, |_| false).unwrap();

        assert!(active.is_empty());
        assert_eq!(active.position(address), None);
    }
}
