//! `element_at(index)`: emits only the value at zero-based `index`, then
//! cancels upstream and completes (§1 Non-goals — conforming instance).
//! Errors with [`StreamError::ProtocolViolation`]-adjacent `NullValue` style
//! semantics if upstream completes before reaching `index`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Emits the single value at `index`, or errors if upstream is shorter.
pub struct ElementAt<T> {
    upstream: Arc<dyn Publisher<T>>,
    index: u64,
}

impl<T: Send + 'static> ElementAt<T> {
    /// Wraps `upstream`, selecting the value at `index`.
    pub fn new(upstream: Arc<dyn Publisher<T>>, index: u64) -> Arc<Self> {
        Arc::new(Self { upstream, index })
    }
}

impl<T: Send + 'static> Publisher<T> for ElementAt<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(ElementAtSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            remaining: AtomicU64::new(self.index),
        });
        self.upstream.clone().subscribe(inner);
    }
}

struct ElementAtSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    remaining: AtomicU64,
}

impl<T: Send + 'static> Subscriber<T> for ElementAtSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        if self.upstream.is_cancelled() {
            return;
        }
        let remaining = self.remaining.load(Ordering::Acquire);
        if remaining == 0 {
            self.upstream.cancel();
            self.downstream.on_next(value);
            self.downstream.on_complete();
        } else {
            self.remaining.store(remaining - 1, Ordering::Release);
            self.upstream.request(1);
        }
    }

    fn on_error(&self, error: StreamError) {
        if !self.upstream.is_cancelled() {
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&self) {
        if !self.upstream.is_cancelled() {
            self.downstream.on_error(StreamError::ProtocolViolation(
                "element_at index beyond upstream length".to_string(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn selects_the_indexed_element() {
        let values = collect(ElementAt::new(Range::new(10, 5), 2));
        assert_eq!(values, vec![12]);
    }
}
