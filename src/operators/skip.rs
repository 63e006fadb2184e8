//! `skip(n)`: drops the first `n` values (§1 Non-goals — conforming
//! instance). Each dropped value consumed upstream demand without a
//! downstream emission, so one replacement unit is requested from upstream
//! per drop, same as `filter`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Drops the first `count` values, then forwards everything else.
pub struct Skip<T> {
    upstream: Arc<dyn Publisher<T>>,
    count: u64,
}

impl<T: Send + 'static> Skip<T> {
    /// Wraps `upstream`, dropping its first `count` values.
    pub fn new(upstream: Arc<dyn Publisher<T>>, count: u64) -> Arc<Self> {
        Arc::new(Self { upstream, count })
    }
}

impl<T: Send + 'static> Publisher<T> for Skip<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(SkipSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            remaining: AtomicU64::new(self.count),
        });
        self.upstream.clone().subscribe(inner);
    }
}

struct SkipSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    remaining: AtomicU64,
}

impl<T: Send + 'static> Subscriber<T> for SkipSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        loop {
            let remaining = self.remaining.load(Ordering::Acquire);
            if remaining == 0 {
                self.downstream.on_next(value);
                return;
            }
            if self
                .remaining
                .compare_exchange(remaining, remaining - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.upstream.request(1);
                return;
            }
        }
    }

    fn on_error(&self, error: StreamError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn drops_the_first_n() {
        let values = collect(Skip::new(Range::new(1, 5), 2));
        assert_eq!(values, vec![3, 4, 5]);
    }
}
