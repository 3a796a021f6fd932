//! Hash entry slots. Every bucket has one head slot, and collisions hang off the head in a singly-linked overflow chain
//! whose nodes are allocated from a `MemoryPool<EntrySlot>`. Links are pool indices.
//!
//! Each slot moves through `Empty -> Reserved -> Committed`. A `Reserved` slot may fall back to `Empty` if its value
//! allocation fails. A `Committed` slot is never changed again until the whole table is reset.

use crate::HashEntry;

use sparse_fusion_core::{Point3i, PointN};

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

/// Marks the end of a chain and the address of an uncommitted slot.
pub const NULL_INDEX: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SlotState {
    Empty = 0,
    /// Claimed by an inserter that has not yet published an address.
    Reserved = 1,
    Committed = 2,
}

impl SlotState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SlotState::Reserved,
            2 => SlotState::Committed,
            _ => SlotState::Empty,
        }
    }
}

#[derive(Debug)]
pub struct EntrySlot {
    state: AtomicU8,
    key: [AtomicI32; 3],
    address: AtomicU32,
    next: AtomicU32,
}

impl Default for EntrySlot {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Empty as u8),
            key: [AtomicI32::new(0), AtomicI32::new(0), AtomicI32::new(0)],
            address: AtomicU32::new(NULL_INDEX),
            next: AtomicU32::new(NULL_INDEX),
        }
    }
}

impl Clone for EntrySlot {
    fn clone(&self) -> Self {
        let key = self.key();

        Self {
            state: AtomicU8::new(self.state() as u8),
            key: [
                AtomicI32::new(key.x()),
                AtomicI32::new(key.y()),
                AtomicI32::new(key.z()),
            ],
            address: AtomicU32::new(self.address()),
            next: AtomicU32::new(self.next()),
        }
    }
}

impl EntrySlot {
    #[inline]
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Only meaningful once the slot is committed, or for chain nodes that are already linked.
    #[inline]
    pub fn key(&self) -> Point3i {
        PointN([
            self.key[0].load(Ordering::Relaxed),
            self.key[1].load(Ordering::Relaxed),
            self.key[2].load(Ordering::Relaxed),
        ])
    }

    #[inline]
    pub fn address(&self) -> u32 {
        self.address.load(Ordering::Relaxed)
    }

    /// Pool index of the next node in the chain, or `NULL_INDEX`.
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub fn committed_entry(&self) -> Option<HashEntry> {
        if self.state() == SlotState::Committed {
            Some(HashEntry {
                key: self.key(),
                address: self.address(),
            })
        } else {
            None
        }
    }

    /// Claims an empty head slot. Exactly one of any number of concurrent callers succeeds.
    #[inline]
    pub(crate) fn try_reserve(&self) -> bool {
        self.state
            .compare_exchange(
                SlotState::Empty as u8,
                SlotState::Reserved as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[inline]
    pub(crate) fn store_key(&self, key: Point3i) {
        self.key[0].store(key.x(), Ordering::Relaxed);
        self.key[1].store(key.y(), Ordering::Relaxed);
        self.key[2].store(key.z(), Ordering::Relaxed);
    }

    /// Readies a freshly allocated chain node that is not linked anywhere yet.
    #[inline]
    pub(crate) fn prepare_node(&self, key: Point3i) {
        self.store_key(key);
        self.address.store(NULL_INDEX, Ordering::Relaxed);
        self.next.store(NULL_INDEX, Ordering::Relaxed);
        self.state
            .store(SlotState::Reserved as u8, Ordering::Relaxed);
    }

    /// Appends `node` after this slot if this slot is the end of its chain. On failure, returns the node that won.
    #[inline]
    pub(crate) fn link(&self, node: u32) -> Result<(), u32> {
        self.next
            .compare_exchange(NULL_INDEX, node, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    #[inline]
    pub(crate) fn commit(&self, address: u32) {
        self.address.store(address, Ordering::Relaxed);
        self.state
            .store(SlotState::Committed as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn abandon(&self) {
        self.state.store(SlotState::Empty as u8, Ordering::Release);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
