//! An internal, runtime-sized bounded SPSC ring buffer (§3 "Queue").
//!
//! Adapted from the teacher crate's `spsc::channel` module: the same
//! head/tail cursor protocol (producer owns `tail`, consumer owns `head`,
//! Acquire/Release pairing to publish buffer writes across the handoff),
//! cache-padded cursors to avoid false sharing, and `Drop` that walks the
//! unread slots to avoid leaking buffered values. The const-generic `N` is
//! replaced with a runtime capacity (rounded up to a power of two) because
//! operator prefetch is a runtime-configured value (§12 of SPEC_FULL.md),
//! not known at compile time like the teacher's channel types.
//!
//! Unlike the teacher's public `Sender`/`Receiver`, this type exposes only
//! non-blocking `try_push`/`try_pop`: per §3 "Queue", polling never blocks
//! and offering just reports failure, with backpressure instead enforced
//! by the demand accounting in [`crate::backpressure`].

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// A bounded single-producer/single-consumer queue with capacity rounded
/// up to the next power of two.
pub struct SpscQueue<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// Safety: access to `buffer` slots is protected by the head/tail cursor
// protocol exactly as in the teacher's `spsc::channel::Channel`: a slot is
// written only by the single producer before it publishes `tail`, and read
// only by the single consumer after it observes that `tail` via Acquire.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Creates a queue whose usable capacity is `capacity.next_power_of_two()`
    /// (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn index(&self, seq: usize) -> usize {
        seq & self.mask
    }

    /// The rounded-up capacity.
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Producer-side push. Returns `Err(value)` if the queue is full.
    ///
    /// # Safety requirements (upheld by callers within this crate)
    /// Must only be called by the single producer for this queue instance.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) >= self.capacity() {
            return Err(value);
        }

        let i = self.index(tail);
        // Safety: slot `i` was vacated by the consumer (we just observed
        // `head` via Acquire covering that release) or never written.
        unsafe { ptr::write((*self.buffer[i].get()).as_mut_ptr(), value) };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer-side pop. Returns `None` if the queue is empty.
    ///
    /// # Safety requirements (upheld by callers within this crate)
    /// Must only be called by the single consumer for this queue instance.
    pub fn try_pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let i = self.index(head);
        // Safety: slot `i` was published by the producer (we just observed
        // `tail` via Acquire covering that release).
        let value = unsafe { ptr::read((*self.buffer[i].get()).as_ptr()) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Approximate number of buffered items (exact absent concurrent
    /// producer/consumer activity).
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        // Safety: `&mut self` gives exclusive access; no atomic load needed
        // to read memory we already own.
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let count = tail.wrapping_sub(head);
        for s in 0..count {
            let i = self.index(head.wrapping_add(s));
            unsafe { ptr::drop_in_place((*self.buffer[i].get()).as_mut_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_up_to_power_of_two() {
        let q: SpscQueue<i32> = SpscQueue::with_capacity(5);
        assert_eq!(q.capacity(), 8);
    }

    #[test]
    fn push_pop_fifo_order() {
        let q = SpscQueue::with_capacity(4);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn full_queue_rejects_push() {
        let q = SpscQueue::with_capacity(2);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert_eq!(q.try_push(3), Err(3));
    }

    #[test]
    fn drop_releases_unread_items() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicUsize;

        #[derive(Clone)]
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        {
            let q = SpscQueue::with_capacity(4);
            q.try_push(DropCounter(counter.clone())).unwrap();
            q.try_push(DropCounter(counter.clone())).unwrap();
            let _ = q.try_pop();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wraparound_keeps_working() {
        let q = SpscQueue::with_capacity(2);
        for i in 0..10 {
            q.try_push(i).unwrap();
            assert_eq!(q.try_pop(), Some(i));
        }
    }
}
