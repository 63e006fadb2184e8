//! `take(n)`: emits at most the first `n` values then cancels upstream and
//! completes (§1 Non-goals — conforming instance).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Emits at most `limit` values.
pub struct Take<T> {
    upstream: Arc<dyn Publisher<T>>,
    limit: u64,
}

impl<T: Send + 'static> Take<T> {
    /// Wraps `upstream`, truncating it to the first `limit` values.
    pub fn new(upstream: Arc<dyn Publisher<T>>, limit: u64) -> Arc<Self> {
        Arc::new(Self { upstream, limit })
    }
}

impl<T: Send + 'static> Publisher<T> for Take<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(TakeSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            remaining: AtomicU64::new(self.limit),
        });
        if self.limit == 0 {
            inner
                .downstream
                .on_subscribe(Arc::new(crate::subscription::NoopSubscription));
            inner.downstream.on_complete();
            return;
        }
        self.upstream.clone().subscribe(inner);
    }
}

struct TakeSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    remaining: AtomicU64,
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        if self.upstream.is_cancelled() {
            return;
        }
        let remaining = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if remaining == 0 {
            return;
        }
        self.downstream.on_next(value);
        if remaining == 1 {
            self.upstream.cancel();
            self.downstream.on_complete();
        }
    }

    fn on_error(&self, error: StreamError) {
        if !self.upstream.is_cancelled() {
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if !self.upstream.is_cancelled() {
            self.downstream.on_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn takes_only_the_first_n() {
        let values = collect(Take::new(Range::new(1, 100), 3));
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn take_zero_completes_immediately() {
        let values = collect(Take::new(Range::new(1, 100), 0));
        assert!(values.is_empty());
    }
}
