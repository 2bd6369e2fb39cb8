//! Sample buffer pool: pre-sized arena of buffers plus a free-list of indices.
//!
//! Ownership moves with `BufferHandle`, which is neither `Clone` nor `Copy`:
//! the producer gets it from `allocate()`, pushing it into the queue hands it to
//! the consumer, and `reclaim()` consumes it back into the free-list. A handle
//! therefore cannot be reclaimed twice.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel as cb;
use parking_lot::Mutex;
use tracing::error;

use crate::buffer::SampleBuffer;

/// Exclusive ownership token for one arena slot.
#[derive(Debug)]
pub struct BufferHandle {
    index: usize,
}

impl BufferHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

pub struct BufferPool {
    slots: Box<[Mutex<SampleBuffer>]>,
    // Bounded to the arena size; doubles as a lock-free free-list.
    free_tx: cb::Sender<usize>,
    free_rx: cb::Receiver<usize>,
    buffer_len: usize,
    reclaimed: AtomicU64,
}

impl BufferPool {
    /// Allocate `capacity` buffers of `buffer_len` samples upfront.
    pub fn new(buffer_len: usize, capacity: usize) -> Self {
        let slots: Box<[Mutex<SampleBuffer>]> = (0..capacity)
            .map(|_| Mutex::new(SampleBuffer::new(buffer_len)))
            .collect();
        let (free_tx, free_rx) = cb::bounded(capacity.max(1));
        for index in 0..capacity {
            let _ = free_tx.try_send(index);
        }
        Self {
            slots,
            free_tx,
            free_rx,
            buffer_len,
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Take a free buffer. Returns None when the arena is exhausted.
    pub fn allocate(&self) -> Option<BufferHandle> {
        self.free_rx.try_recv().ok().map(|index| BufferHandle { index })
    }

    /// Return a buffer to the free-list. Its trigger bitmap is cleared for the next owner.
    pub fn reclaim(&self, handle: BufferHandle) {
        // A handle from a larger pool has no slot here.
        let Some(slot) = self.slots.get(handle.index) else {
            error!(
                index = handle.index,
                capacity = self.capacity(),
                "reclaim of handle outside this pool"
            );
            return;
        };
        slot.lock().clear_triggers();
        if let Err(e) = self.free_tx.try_send(handle.index) {
            // Only reachable with a handle from another pool.
            error!(index = handle.index, error = %e, "buffer reclaim overflowed free-list");
            return;
        }
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read access to the buffer behind `handle`.
    pub fn with_buffer<R>(&self, handle: &BufferHandle, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        f(&self.slots[handle.index].lock())
    }

    /// Write access to the buffer behind `handle` (producer side).
    pub fn with_buffer_mut<R>(
        &self,
        handle: &mut BufferHandle,
        f: impl FnOnce(&mut SampleBuffer) -> R,
    ) -> R {
        f(&mut self.slots[handle.index].lock())
    }

    /// Number of buffers currently on the free-list.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Number of buffers in the arena.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Total number of reclaim calls that returned a buffer to the free-list.
    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }
}
