//! Lock-free ring buffer for moving events between threads
//!
//! A fixed, power-of-two array of slots plus two monotonically increasing
//! indices. The writer fills `slots[write & mask]` and publishes with a
//! release store of the write index; the reader acquires the write index
//! before touching a slot and releases the read index once the slot is free.
//! Nothing allocates after construction.
//!
//! `spsc` hands out a single [`RingWriter`]. `mpsc` hands out a cloneable
//! [`SharedRingWriter`] whose writers serialize on a mutex around the slot
//! write and index update; the read path stays lock-free in both cases.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{self, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("ring buffer capacity must be a non-zero power of two, got {0}")]
    CapacityNotPowerOfTwo(usize),
}

struct Shared<T> {
    /// Next slot the reader will consume.
    read_index: CachePadded<AtomicUsize>,
    /// Next slot a writer will fill.
    write_index: CachePadded<AtomicUsize>,
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: slots are only touched through the index protocol below: a slot in
// [read_index, write_index) belongs to the reader, every other slot to the
// (single, or mutex-serialized) writer.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn with_capacity(capacity: usize) -> Result<Self, RingBufferError> {
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::CapacityNotPowerOfTwo(capacity));
        }

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Shared {
            read_index: CachePadded::new(AtomicUsize::new(0)),
            write_index: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
            slots,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Racy occupancy estimate.
    fn len(&self) -> usize {
        let read = self.read_index.load(Ordering::Acquire);
        let write = self.write_index.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.capacity())
    }

    /// # Safety
    ///
    /// At most one thread may be inside `push` at any time.
    #[inline]
    unsafe fn push(&self, item: T, cached_read: &mut usize) -> Result<(), T> {
        let write = self.write_index.load(Ordering::Relaxed);

        if write.wrapping_sub(*cached_read) >= self.capacity() {
            *cached_read = self.read_index.load(Ordering::Acquire);
            if write.wrapping_sub(*cached_read) >= self.capacity() {
                return Err(item);
            }
        }

        // SAFETY: the slot lies outside [read, write) so the reader is not
        // looking at it, and the caller guarantees no other writer.
        unsafe {
            (*self.slots[write & self.mask].get()).write(item);
        }
        self.write_index
            .store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// # Safety
    ///
    /// At most one thread may be inside `pop` at any time.
    #[inline]
    unsafe fn pop(&self, cached_write: &mut usize) -> Option<T> {
        let read = self.read_index.load(Ordering::Relaxed);

        if read == *cached_write {
            *cached_write = self.write_index.load(Ordering::Acquire);
            if read == *cached_write {
                return None;
            }
        }

        // SAFETY: read < write, so the slot was initialized by a push whose
        // release store we acquired; only this reader moves read_index.
        let item = unsafe { (*self.slots[read & self.mask].get()).assume_init_read() };
        self.read_index.store(read.wrapping_add(1), Ordering::Release);
        Some(item)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let read = *self.read_index.get_mut();
        let write = *self.write_index.get_mut();
        let mask = self.mask;
        let mut index = read;
        while index != write {
            // SAFETY: exclusive access; slots in [read, write) are initialized.
            unsafe {
                self.slots[index & mask].get_mut().assume_init_drop();
            }
            index = index.wrapping_add(1);
        }
    }
}

/// Create a single-producer single-consumer ring buffer.
pub fn spsc<T: Send>(capacity: usize) -> Result<(RingWriter<T>, RingReader<T>), RingBufferError> {
    let shared = Arc::new(Shared::with_capacity(capacity)?);
    Ok((
        RingWriter {
            shared: Arc::clone(&shared),
            cached_read: 0,
        },
        RingReader {
            shared,
            cached_write: 0,
        },
    ))
}

/// Create a multi-producer single-consumer ring buffer.
pub fn mpsc<T: Send>(
    capacity: usize,
) -> Result<(SharedRingWriter<T>, RingReader<T>), RingBufferError> {
    let shared = Arc::new(Shared::with_capacity(capacity)?);
    Ok((
        SharedRingWriter {
            shared: Arc::clone(&shared),
            write_lock: Arc::new(Mutex::new(0)),
        },
        RingReader {
            shared,
            cached_write: 0,
        },
    ))
}

/// The only writer of an SPSC ring buffer. Not `Clone`.
pub struct RingWriter<T> {
    shared: Arc<Shared<T>>,
    cached_read: usize,
}

impl<T> RingWriter<T> {
    /// Write `item`, or hand it back if the buffer is full.
    #[inline]
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        // SAFETY: `&mut self` on the unique writer handle.
        unsafe { self.shared.push(item, &mut self.cached_read) }
    }

    /// Write `item`; returns false (dropping it) when the buffer is full.
    #[inline]
    pub fn try_write(&mut self, item: T) -> bool {
        self.try_push(item).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// Cloneable writer of an MPSC ring buffer.
pub struct SharedRingWriter<T> {
    shared: Arc<Shared<T>>,
    /// Serializes writers; guards the cached read index.
    write_lock: Arc<Mutex<usize>>,
}

impl<T> Clone for SharedRingWriter<T> {
    fn clone(&self) -> Self {
        SharedRingWriter {
            shared: Arc::clone(&self.shared),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<T> SharedRingWriter<T> {
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut cached_read = self.write_lock.lock();
        // SAFETY: the write lock admits one writer at a time.
        unsafe { self.shared.push(item, &mut cached_read) }
    }

    pub fn try_write(&self, item: T) -> bool {
        self.try_push(item).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// The only reader of a ring buffer.
pub struct RingReader<T> {
    shared: Arc<Shared<T>>,
    cached_write: usize,
}

impl<T> RingReader<T> {
    #[inline]
    pub fn try_read(&mut self) -> Option<T> {
        // SAFETY: `&mut self` on the unique reader handle.
        unsafe { self.shared.pop(&mut self.cached_write) }
    }

    /// Drop everything currently buffered and return how many items went.
    pub fn discard(&mut self) -> usize {
        let mut discarded = 0;
        while self.try_read().is_some() {
            discarded += 1;
        }
        discarded
    }

    /// True once every writer handle has been dropped. Once this returns
    /// true, every item those writers pushed is visible to `try_read`.
    pub fn is_disconnected(&self) -> bool {
        if Arc::strong_count(&self.shared) == 1 {
            atomic::fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

impl<T> Iterator for RingReader<T> {
    type Item = T;

    /// Non-blocking; `None` means empty right now, not closed.
    fn next(&mut self) -> Option<T> {
        self.try_read()
    }
}

impl<T> fmt::Debug for RingReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> fmt::Debug for RingWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingWriter")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> fmt::Debug for SharedRingWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRingWriter")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
