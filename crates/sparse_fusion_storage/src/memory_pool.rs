//! Fixed-capacity slot allocation.
//!
//! The free list is a stack of slot indices. Allocation pops from the stack by atomically decrementing the stack top,
//! so any number of threads can allocate through a shared reference without locks. Releasing pushes back onto the stack
//! and therefore needs exclusive access, which also means that a pass of parallel allocations never observes a release.
//!
//! A `MemoryPool` can also take slots back through a shared reference with `recycle`. Those go onto a separate
//! lock-free stack that `allocate` drains first.

use crate::{StorageError, StorageResult};

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Hands out integer slot indices in `0..capacity`.
///
/// After a `reset`, slots come out in increasing order: `0, 1, 2, ...`.
#[derive(Debug)]
pub struct SlotAllocator {
    free: Vec<u32>,
    top: AtomicUsize,
}

impl SlotAllocator {
    pub fn new(capacity: usize) -> Self {
        let mut allocator = Self {
            free: vec![0; capacity],
            top: AtomicUsize::new(0),
        };
        allocator.reset();

        allocator
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn num_free(&self) -> usize {
        self.top.load(Ordering::Acquire)
    }

    #[inline]
    pub fn num_allocated(&self) -> usize {
        self.capacity() - self.num_free()
    }

    /// Claims a free slot. Safe to call from many threads at once.
    #[inline]
    pub fn allocate(&self) -> StorageResult<u32> {
        let top = self
            .top
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |top| top.checked_sub(1))
            .map_err(|_| StorageError::PoolFull {
                capacity: self.capacity(),
            })?;

        // The stack below `top` is only written by `release` and `reset`, which take `&mut self`.
        Ok(self.free[top - 1])
    }

    /// Returns `slot` to the free stack.
    pub fn release(&mut self, slot: u32) -> StorageResult<()> {
        let capacity = self.capacity();
        let top = self.top.get_mut();
        if slot as usize >= capacity || *top >= capacity {
            return Err(StorageError::OutOfBounds {
                index: slot as usize,
                len: capacity,
            });
        }
        self.free[*top] = slot;
        *top += 1;

        Ok(())
    }

    /// Frees every slot.
    pub fn reset(&mut self) {
        let capacity = self.free.len();
        for (i, slot) in self.free.iter_mut().enumerate() {
            *slot = (capacity - 1 - i) as u32;
        }
        *self.top.get_mut() = capacity;
    }

    /// The slots allocated since the allocator had `num_allocated_before` slots in use, assuming nothing was released
    /// in between. Because slots are popped from a stack, these always form one contiguous run of the free stack.
    pub fn allocated_after(&self, num_allocated_before: usize) -> &[u32] {
        let top = self.num_free();
        let old_top = self.capacity().saturating_sub(num_allocated_before).max(top);

        &self.free[top..old_top]
    }
}

impl Clone for SlotAllocator {
    fn clone(&self) -> Self {
        Self {
            free: self.free.clone(),
            top: AtomicUsize::new(self.num_free()),
        }
    }
}

const EMPTY_LINK: u32 = u32::MAX;

#[inline]
fn pack_head(tag: u32, slot: u32) -> u64 {
    (tag as u64) << 32 | slot as u64
}

#[inline]
fn unpack_head(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

/// Slots given back while other threads may be allocating. A Treiber stack linked through `links`, one link per slot.
/// The head carries a tag that every push and pop bumps, so a pop that read a stale link can't succeed.
#[derive(Debug)]
struct RecycleStack {
    head: AtomicU64,
    links: Vec<AtomicU32>,
    // Bumped before a push is published, so it never underflows.
    len: AtomicUsize,
}

impl RecycleStack {
    fn new(capacity: usize) -> Self {
        Self {
            head: AtomicU64::new(pack_head(0, EMPTY_LINK)),
            links: (0..capacity).map(|_| AtomicU32::new(EMPTY_LINK)).collect(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn push(&self, slot: u32) {
        self.len.fetch_add(1, Ordering::AcqRel);

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack_head(head);
            self.links[slot as usize].store(top, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack_head(tag.wrapping_add(1), slot),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }

    fn pop(&self) -> Option<u32> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let (tag, top) = unpack_head(head);
            if top == EMPTY_LINK {
                return None;
            }
            let below = self.links[top as usize].load(Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                pack_head(tag.wrapping_add(1), below),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::AcqRel);

                    return Some(top);
                }
                Err(current) => head = current,
            }
        }
    }

    fn clear(&mut self) {
        *self.head.get_mut() = pack_head(0, EMPTY_LINK);
        *self.len.get_mut() = 0;
    }
}

impl Clone for RecycleStack {
    fn clone(&self) -> Self {
        Self {
            head: AtomicU64::new(self.head.load(Ordering::Acquire)),
            links: self
                .links
                .iter()
                .map(|link| AtomicU32::new(link.load(Ordering::Relaxed)))
                .collect(),
            len: AtomicUsize::new(self.len()),
        }
    }
}

/// A `SlotAllocator` paired with one record per slot.
///
/// Records are not dropped or cleared when their slot is released; the next owner overwrites them.
#[derive(Clone, Debug)]
pub struct MemoryPool<T> {
    slots: SlotAllocator,
    recycled: RecycleStack,
    records: Vec<T>,
}

impl<T> MemoryPool<T>
where
    T: Default,
{
    pub fn new(capacity: usize) -> Self {
        let mut records = Vec::with_capacity(capacity);
        records.resize_with(capacity, T::default);

        Self {
            slots: SlotAllocator::new(capacity),
            recycled: RecycleStack::new(capacity),
            records,
        }
    }
}

impl<T> MemoryPool<T> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn num_allocated(&self) -> usize {
        self.slots
            .num_allocated()
            .saturating_sub(self.recycled.len())
    }

    /// Claims a free slot, preferring recycled ones. Safe to call from many threads at once.
    #[inline]
    pub fn allocate(&self) -> StorageResult<u32> {
        match self.recycled.pop() {
            Some(slot) => Ok(slot),
            None => self.slots.allocate(),
        }
    }

    pub fn release(&mut self, slot: u32) -> StorageResult<()> {
        self.slots.release(slot)
    }

    /// Gives back a slot that was allocated but never shared with another thread. Unlike `release`, this is safe to
    /// call while other threads allocate.
    pub fn recycle(&self, slot: u32) -> StorageResult<()> {
        if slot as usize >= self.capacity() {
            return Err(StorageError::OutOfBounds {
                index: slot as usize,
                len: self.capacity(),
            });
        }
        self.recycled.push(slot);

        Ok(())
    }

    #[inline]
    pub fn get(&self, slot: u32) -> Option<&T> {
        self.records.get(slot as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.records.get_mut(slot as usize)
    }

    pub fn write(&mut self, slot: u32, record: T) -> StorageResult<()> {
        let len = self.records.len();
        let dst = self
            .records
            .get_mut(slot as usize)
            .ok_or(StorageError::OutOfBounds {
                index: slot as usize,
                len,
            })?;
        *dst = record;

        Ok(())
    }

    /// Frees every slot. Records keep their stale contents.
    pub fn reset(&mut self) {
        self.slots.reset();
        self.recycled.clear();
    }
}

impl<T> MemoryPool<T>
where
    T: Clone,
{
    #[inline]
    pub fn read(&self, slot: u32) -> Option<T> {
        self.get(slot).cloned()
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

    #[test]
    fn slots_come_out_in_order_until_full() {
        let allocator = SlotAllocator::new(3);

        assert_eq!(allocator.allocate(), Ok(0));
        assert_eq!(allocator.allocate(), Ok(1));
        assert_eq!(allocator.allocate(), Ok(2));
        assert_eq!(
            allocator.allocate(),
            Err(StorageError::PoolFull { capacity: 3 })
        );
        assert_eq!(allocator.num_free(), 0);
    }

    #[test]
    fn released_slot_is_reused() {
        let mut allocator = SlotAllocator::new(2);
        let a = allocator.allocate().unwrap();
        let _b = allocator.allocate().unwrap();

        allocator.release(a).unwrap();

        assert_eq!(allocator.allocate(), Ok(a));
    }

    #[test]
    fn release_rejects_foreign_slot() {
        let mut allocator = SlotAllocator::new(2);

        assert!(allocator.release(7).is_err());
        // Nothing was allocated, so the stack is already full.
        assert!(allocator.release(0).is_err());
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let allocator = SlotAllocator::new(10_000);

        let mut slots: Vec<u32> = (0..12_000)
            .into_par_iter()
            .filter_map(|_| allocator.allocate().ok())
            .collect();
        slots.sort_unstable();

        assert_eq!(slots, (0..10_000).collect::<Vec<u32>>());
    }

    #[test]
    fn allocated_after_reports_new_run() {
        let allocator = SlotAllocator::new(8);
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        let mark = allocator.num_allocated();
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        let mut new_slots = allocator.allocated_after(mark).to_vec();
        new_slots.sort_unstable();
        assert_eq!(new_slots, vec![2, 3, 4]);
    }

    #[test]
    fn pool_read_write() {
        let mut pool = MemoryPool::<u64>::new(4);
        let slot = pool.allocate().unwrap();

        pool.write(slot, 42).unwrap();

        assert_eq!(pool.read(slot), Some(42));
        assert_eq!(pool.num_allocated(), 1);
        assert!(pool.write(9, 1).is_err());

        pool.reset();
        assert_eq!(pool.num_allocated(), 0);
    }

    #[test]
    fn recycled_slots_come_back_first() {
        let pool = MemoryPool::<u64>::new(4);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();

        pool.recycle(a).unwrap();
        pool.recycle(b).unwrap();
        assert_eq!(pool.num_allocated(), 0);

        assert_eq!(pool.allocate(), Ok(b));
        assert_eq!(pool.allocate(), Ok(a));
        assert_eq!(pool.allocate(), Ok(2));
        assert_eq!(pool.num_allocated(), 3);
        assert!(pool.recycle(4).is_err());
    }

    #[test]
    fn recycling_while_allocating_never_duplicates_a_slot() {
        let pool = MemoryPool::<u64>::new(1000);

        // Every task recycles every other slot it gets, so the stack is popped and pushed concurrently.
        let mut kept: Vec<u32> = (0..20_000)
            .into_par_iter()
            .filter_map(|i| {
                let slot = pool.allocate().ok()?;
                if i % 2 == 0 {
                    pool.recycle(slot).unwrap();
                    None
                } else {
                    Some(slot)
                }
            })
            .collect();
        kept.sort_unstable();
        let num_kept = kept.len();
        kept.dedup();

        assert_eq!(kept.len(), num_kept);
        assert_eq!(pool.num_allocated(), num_kept);

        let mut rest: Vec<u32> = std::iter::from_fn(|| pool.allocate().ok()).collect();
        rest.extend(kept);
        rest.sort_unstable();
        assert_eq!(rest, (0..1000).collect::<Vec<u32>>());
    }
}
