//! `reduce`: folds an entire upstream into a single terminal value (§8
//! "scan(z, f).last() == reduce(z, f)"). Since the eventual emission count
//! is always exactly one regardless of how the downstream paces its
//! requests, `reduce` requests everything from upstream immediately and
//! holds the single result until both accumulation is complete and the
//! downstream has asked for at least one item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::backpressure::UNBOUNDED;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Folds every upstream value into `acc` starting from `seed`, emitting the
/// final accumulator on upstream completion.
pub struct Reduce<T, U> {
    upstream: Arc<dyn Publisher<T>>,
    seed: U,
    f: Box<dyn Fn(&U, T) -> U + Send + Sync>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> Reduce<T, U> {
    /// Wraps `upstream`, folding from `seed` with `f`.
    pub fn new(
        upstream: Arc<dyn Publisher<T>>,
        seed: U,
        f: impl Fn(&U, T) -> U + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            seed,
            f: Box::new(f),
        })
    }
}

impl<T: Send + 'static, U: Clone + Send + 'static> Publisher<U> for Reduce<T, U> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<U>>) {
        let inner = Arc::new(ReduceSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            acc: Mutex::new(self.seed.clone()),
            requested: AtomicBool::new(false),
            upstream_completed: AtomicBool::new(false),
            emitted: AtomicBool::new(false),
            reduce: self,
        });
        let downstream_subscription: Arc<dyn Subscription> = Arc::new(ReduceSubscription {
            inner: inner.clone(),
        });
        inner.downstream.on_subscribe(downstream_subscription);
        inner.reduce.upstream.clone().subscribe(inner);
    }
}

struct ReduceSubscription<T, U> {
    inner: Arc<ReduceSubscriber<T, U>>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> Subscription for ReduceSubscription<T, U> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        if !self.inner.requested.swap(true, Ordering::AcqRel)
            && self.inner.upstream_completed.load(Ordering::Acquire)
        {
            self.inner.emit_final();
        }
    }

    fn cancel(&self) {
        self.inner.upstream.cancel();
    }
}

struct ReduceSubscriber<T, U> {
    downstream: Arc<dyn Subscriber<U>>,
    upstream: Arc<UpstreamSlot>,
    acc: Mutex<U>,
    requested: AtomicBool,
    upstream_completed: AtomicBool,
    emitted: AtomicBool,
    reduce: Arc<Reduce<T, U>>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> ReduceSubscriber<T, U> {
    fn emit_final(&self) {
        if self.upstream.is_cancelled() || self.emitted.swap(true, Ordering::AcqRel) {
            return;
        }
        let acc = self.acc.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.downstream.on_next(acc);
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static, U: Clone + Send + 'static> Subscriber<T> for ReduceSubscriber<T, U> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        self.upstream.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        let mut acc = self.acc.lock().unwrap_or_else(|e| e.into_inner());
        *acc = (self.reduce.f)(&acc, value);
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.upstream_completed.store(true, Ordering::Release);
        if self.requested.load(Ordering::Acquire) {
            self.emit_final();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn sums_the_whole_range() {
        let values = collect(Reduce::new(Range::new(1, 5), 0i64, |acc, x| acc + x));
        assert_eq!(values, vec![15]);
    }
}
