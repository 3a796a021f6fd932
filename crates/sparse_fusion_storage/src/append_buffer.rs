use crate::{StorageError, StorageResult};

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fixed-capacity array with a live prefix that grows by appending.
///
/// Storage is allocated once and kept across `reset_count` calls, so a buffer can be reused for every frame. Parallel
/// appends go through an [`Appender`], which holds the buffer's only borrow while it exists.
#[derive(Debug)]
pub struct AppendBuffer<T> {
    items: Vec<T>,
    count: AtomicUsize,
}

impl<T> AppendBuffer<T>
where
    T: Clone + Default,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            items: vec![T::default(); capacity],
            count: AtomicUsize::new(0),
        }
    }
}

impl<T> AppendBuffer<T> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// The length of the live prefix.
    #[inline]
    pub fn size(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Rewinds to an empty live prefix without touching storage.
    #[inline]
    pub fn reset_count(&mut self) {
        *self.count.get_mut() = 0;
    }

    /// Starts a pass of (possibly parallel) appends.
    pub fn appender(&mut self) -> Appender<'_, T> {
        let Self { items, count } = self;
        let capacity = items.len();

        Appender {
            ptr: items.as_mut_ptr(),
            capacity,
            count: &*count,
            marker: PhantomData,
        }
    }

    /// Single-threaded append.
    pub fn push(&mut self, value: T) -> StorageResult<usize> {
        self.appender().append(value)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.size()]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Overwrites an element of the live prefix.
    pub fn set(&mut self, index: usize, value: T) -> StorageResult<()> {
        let len = self.size();
        if index >= len {
            return Err(StorageError::OutOfBounds { index, len });
        }
        self.items[index] = value;

        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> AppendBuffer<T>
where
    T: Clone,
{
    /// Copies out the live prefix.
    pub fn download(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Replaces the live prefix with `values`.
    pub fn upload(&mut self, values: &[T]) -> StorageResult<()> {
        if values.len() > self.capacity() {
            return Err(StorageError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        self.items[..values.len()].clone_from_slice(values);
        *self.count.get_mut() = values.len();

        Ok(())
    }
}

impl<T> Clone for AppendBuffer<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            count: AtomicUsize::new(self.size()),
        }
    }
}

/// Shared handle for appending to an `AppendBuffer` from many threads.
pub struct Appender<'a, T> {
    ptr: *mut T,
    capacity: usize,
    count: &'a AtomicUsize,
    marker: PhantomData<&'a mut [T]>,
}

// SAFETY: Every successful `append` claims a distinct index with an atomic counter, so no two threads ever write the
// same element, and the mutable borrow held by the `Appender` keeps all readers away until it is dropped.
unsafe impl<T: Send> Send for Appender<'_, T> {}
unsafe impl<T: Send> Sync for Appender<'_, T> {}

impl<T> Appender<'_, T> {
    /// Stores `value` at the next free position and returns that position.
    #[inline]
    pub fn append(&self, value: T) -> StorageResult<usize> {
        let capacity = self.capacity;
        let position = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < capacity {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .map_err(|_| StorageError::CapacityExceeded { capacity })?;

        // SAFETY: `position < capacity` and it was handed to this call alone.
        unsafe {
            *self.ptr.add(position) = value;
        }

        Ok(position)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.count.load(Ordering::Acquire)
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
    fn parallel_append_fills_to_capacity() {
        let mut buffer = AppendBuffer::<u32>::new(1000);

        let failures = {
            let appender = buffer.appender();
            (0..1500u32)
                .into_par_iter()
                .filter(|i| appender.append(*i).is_err())
                .count()
        };

        assert_eq!(failures, 500);
        assert_eq!(buffer.size(), 1000);

        let mut values = buffer.download();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 1000);
    }

    #[test]
    fn reset_count_reuses_storage() {
        let mut buffer = AppendBuffer::<u32>::new(4);
        buffer.push(1).unwrap();
        buffer.push(2).unwrap();

        buffer.reset_count();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(3), Ok(0));
        assert_eq!(buffer.as_slice(), &[3]);
    }

    #[test]
    fn set_only_inside_live_prefix() {
        let mut buffer = AppendBuffer::<u32>::new(4);
        buffer.push(1).unwrap();

        buffer.set(0, 5).unwrap();
        assert_eq!(buffer.get(0), Some(&5));
        assert_eq!(
            buffer.set(1, 5),
            Err(StorageError::OutOfBounds { index: 1, len: 1 })
        );
    }

    #[test]
    fn upload_replaces_live_prefix() {
        let mut buffer = AppendBuffer::<u32>::new(3);
        buffer.push(9).unwrap();

        buffer.upload(&[1, 2]).unwrap();
        assert_eq!(buffer.download(), vec![1, 2]);

        assert_eq!(
            buffer.upload(&[1, 2, 3, 4]),
            Err(StorageError::CapacityExceeded { capacity: 3 })
        );
    }
}
