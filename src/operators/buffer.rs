//! `buffer` (§4.4, config in §6): the canonical post-complete-drain user.
//! Collects upstream values into `Vec<T>` buffers of `size` items, opening
//! a new buffer every `skip` items — `skip == size` gives exact
//! non-overlapping buffers, `skip > size` drops items between buffers,
//! `skip < size` overlaps them. Upstream may complete while a partial
//! buffer is still open; that partial buffer is flushed as the final
//! emission (§8 scenario 4).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::backpressure::UNBOUNDED;
use crate::drain::Wip;
use crate::post_complete::PostCompleteField;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Configuration for [`Buffer`] (§6 "buffer: {size, skip, buffer-supplier}").
pub struct BufferConfig<T> {
    /// Number of items per buffer.
    pub size: usize,
    /// Items between the start of consecutive buffers.
    pub skip: usize,
    /// Produces a fresh, empty buffer collection. Defaults to `Vec::new`.
    pub buffer_supplier: Arc<dyn Fn() -> Vec<T> + Send + Sync>,
}

impl<T: Send + 'static> BufferConfig<T> {
    /// `size == skip`: exact, non-overlapping buffers.
    pub fn exact(size: usize) -> Self {
        Self {
            size,
            skip: size,
            buffer_supplier: Arc::new(Vec::new),
        }
    }
}

/// Groups upstream values into `Vec<T>` buffers per [`BufferConfig`].
pub struct Buffer<T> {
    upstream: Arc<dyn Publisher<T>>,
    config: BufferConfig<T>,
}

impl<T: Send + Clone + 'static> Buffer<T> {
    /// Wraps `upstream`, buffering per `config`.
    pub fn new(upstream: Arc<dyn Publisher<T>>, config: BufferConfig<T>) -> Arc<Self> {
        Arc::new(Self { upstream, config })
    }
}

impl<T: Send + Clone + 'static> Publisher<Vec<T>> for Buffer<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<Vec<T>>>) {
        let state = Arc::new(BufferState {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            ready: Mutex::new(VecDeque::new()),
            active: Mutex::new(VecDeque::new()),
            count: AtomicU64::new(0),
            field: PostCompleteField::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            completed_signaled: AtomicBool::new(false),
            size: self.config.size.max(1),
            skip: self.config.skip.max(1),
            supplier: self.config.buffer_supplier.clone(),
        });
        state
            .downstream
            .on_subscribe(Arc::new(BufferSubscription { state: state.clone() }));
        self.upstream
            .clone()
            .subscribe(Arc::new(UpstreamListener { state }));
    }
}

struct BufferState<T> {
    downstream: Arc<dyn Subscriber<Vec<T>>>,
    upstream: Arc<UpstreamSlot>,
    ready: Mutex<VecDeque<Vec<T>>>,
    active: Mutex<VecDeque<Vec<T>>>,
    count: AtomicU64,
    field: PostCompleteField,
    wip: Wip,
    cancelled: AtomicBool,
    completed_signaled: AtomicBool,
    size: usize,
    skip: usize,
    supplier: Arc<dyn Fn() -> Vec<T> + Send + Sync>,
}

impl<T: Send + Clone + 'static> BufferState<T> {
    fn accept(&self, value: T) {
        let count = self.count.fetch_add(1, Ordering::AcqRel);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if count % self.skip as u64 == 0 {
            active.push_back((self.supplier)());
        }
        for buf in active.iter_mut() {
            buf.push(value.clone());
        }
        while active.front().is_some_and(|b| b.len() >= self.size) {
            let full = active.pop_front().expect("checked non-empty above");
            self.ready.lock().unwrap_or_else(|e| e.into_inner()).push_back(full);
        }
    }

    fn flush_partial(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(buf) = active.pop_front() {
            if !buf.is_empty() {
                ready.push_back(buf);
            }
        }
    }

    fn enter_and_drain(self: &Arc<Self>) {
        if self.wip.enter() {
            self.drain();
        }
    }

    fn clear(&self) {
        self.ready.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.upstream.cancel();
    }

    fn drain(self: &Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.clear();
                return;
            }

            let mut demand = self.field.demand();
            let mut emitted = 0u64;
            while demand > 0 {
                let next = self.ready.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                match next {
                    Some(buf) => {
                        self.downstream.on_next(buf);
                        emitted += 1;
                        demand -= 1;
                    }
                    None => break,
                }
            }
            if emitted > 0 {
                self.field.subtract(emitted);
            }

            if self.ready.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
                && self.field.is_completed()
                && !self.completed_signaled.swap(true, Ordering::AcqRel)
            {
                self.downstream.on_complete();
                return;
            }

            missed = self.wip.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

struct UpstreamListener<T> {
    state: Arc<BufferState<T>>,
}

impl<T: Send + Clone + 'static> Subscriber<T> for UpstreamListener<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.state.upstream.set(subscription);
        // §4.4 doesn't size the upstream request against downstream
        // demand — window boundaries are this operator's own concern, so
        // it simply asks for everything up front.
        self.state.upstream.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        self.state.accept(value);
        self.state.enter_and_drain();
    }

    fn on_error(&self, error: StreamError) {
        self.state.clear();
        self.state.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.state.flush_partial();
        if self.state.ready.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
            if !self.state.completed_signaled.swap(true, Ordering::AcqRel) {
                self.state.downstream.on_complete();
            }
            return;
        }
        self.state.field.complete();
        self.state.enter_and_drain();
    }
}

struct BufferSubscription<T> {
    state: Arc<BufferState<T>>,
}

impl<T: Send + Clone + 'static> Subscription for BufferSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.state.field.request(n);
        self.state.enter_and_drain();
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.enter_and_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn exact_buffers_tile_the_source() {
        // §8 scenario 4.
        let buffers = collect(Buffer::new(Range::new(1, 9), BufferConfig::exact(3)));
        assert_eq!(
            buffers,
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]]
        );
    }

    #[test]
    fn trailing_partial_buffer_is_flushed() {
        let buffers = collect(Buffer::new(Range::new(1, 10), BufferConfig::exact(3)));
        assert_eq!(
            buffers,
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]
        );
    }

    #[test]
    fn overlapping_windows_share_items() {
        let buffers = collect(Buffer::new(
            Range::new(1, 4),
            BufferConfig {
                size: 2,
                skip: 1,
                buffer_supplier: Arc::new(Vec::new),
            },
        ));
        assert_eq!(
            buffers,
            vec![vec![1, 2], vec![2, 3], vec![3, 4], vec![4]]
        );
    }
}
