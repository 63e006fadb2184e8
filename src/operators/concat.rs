//! `concat` — sequential composition (§4.7): subscribes to an ordered
//! sequence of publishers one at a time. Inner subscriptions never
//! overlap, so unlike `flat_map`/`merge`/`zip` no internal queue is
//! needed — demand is simply carried forward from one inner to the next.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Subscribes to `sources[0]`, then `sources[1]`, … in order, forwarding
/// outstanding demand from each inner to the next as it completes. If
/// `delay_errors` is set, an inner error is stored and the sequence
/// continues; otherwise the first error short-circuits immediately.
pub struct Concat<T> {
    sources: Vec<Arc<dyn Publisher<T>>>,
    delay_errors: bool,
}

impl<T: Send + 'static> Concat<T> {
    /// Concatenates `sources` in order.
    pub fn new(sources: Vec<Arc<dyn Publisher<T>>>, delay_errors: bool) -> Arc<Self> {
        Arc::new(Self {
            sources,
            delay_errors,
        })
    }
}

impl<T: Send + 'static> Publisher<T> for Concat<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let state = Arc::new(ConcatState {
            downstream: subscriber,
            sources: self.sources.clone(),
            index: AtomicUsize::new(0),
            requested: Mutex::new(0),
            current: Mutex::new(Arc::new(UpstreamSlot::new())),
            cancelled: AtomicBool::new(false),
            errors: Mutex::new(Vec::new()),
            delay_errors: self.delay_errors,
        });
        state
            .downstream
            .on_subscribe(Arc::new(ConcatSubscription {
                state: state.clone(),
            }));
        if state.sources.is_empty() {
            state.downstream.on_complete();
            return;
        }
        state.advance();
    }
}

struct ConcatState<T> {
    downstream: Arc<dyn Subscriber<T>>,
    sources: Vec<Arc<dyn Publisher<T>>>,
    index: AtomicUsize,
    requested: Mutex<u64>,
    current: Mutex<Arc<UpstreamSlot>>,
    cancelled: AtomicBool,
    errors: Mutex<Vec<StreamError>>,
    delay_errors: bool,
}

impl<T: Send + 'static> ConcatState<T> {
    /// Subscribes to the next source, carrying forward any outstanding
    /// demand. Called once synchronously at the start, and again every
    /// time an inner completes.
    fn advance(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let i = self.index.fetch_add(1, Ordering::AcqRel);
        let Some(source) = self.sources.get(i).cloned() else {
            self.finish();
            return;
        };
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(UpstreamSlot::new());
        source.subscribe(Arc::new(InnerListener { state: self.clone() }));
    }

    fn finish(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        if errors.is_empty() {
            self.downstream.on_complete();
        } else {
            let mut drained = errors.drain(..);
            let first = drained.next().expect("non-empty");
            let combined = drained.fold(first, StreamError::combine);
            self.downstream.on_error(combined);
        }
    }
}

struct InnerListener<T> {
    state: Arc<ConcatState<T>>,
}

impl<T: Send + 'static> Subscriber<T> for InnerListener<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let slot = self
            .state
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        slot.set(subscription);
        let outstanding = *self
            .state
            .requested
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if outstanding > 0 {
            slot.request(outstanding);
        }
    }

    fn on_next(&self, value: T) {
        let mut requested = self
            .state
            .requested
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *requested = requested.saturating_sub(1);
        drop(requested);
        self.state.downstream.on_next(value);
    }

    fn on_error(&self, error: StreamError) {
        if self.state.delay_errors {
            self.state
                .errors
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(error);
            self.state.advance();
        } else {
            self.state.cancelled.store(true, Ordering::Release);
            self.state.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        self.state.advance();
    }
}

struct ConcatSubscription<T> {
    state: Arc<ConcatState<T>>,
}

impl<T: Send + 'static> Subscription for ConcatSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        let mut requested = self
            .state
            .requested
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *requested = crate::backpressure::add_cap(*requested, n);
        drop(requested);
        self.state
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .request(n);
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn concatenates_sources_in_order() {
        // §8 scenario 2: concat-array([range(1,3), range(10,2)]).
        let values = collect(Concat::new(
            vec![Range::new(1, 3), Range::new(10, 2)],
            false,
        ));
        assert_eq!(values, vec![1, 2, 3, 10, 11]);
    }

    #[test]
    fn single_source_concat_is_identity() {
        let values = collect(Concat::new(vec![Range::new(1, 5)], false));
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }
}
