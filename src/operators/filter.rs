//! `filter`: a stateless predicate (§1 Non-goals — conforming instance).
//! Unlike `map`, a dropped item still consumed one unit of *upstream*
//! demand without producing a downstream emission, so the operator
//! requests one replacement item from upstream for every value it drops —
//! otherwise downstream demand and upstream requests would drift apart.

use std::sync::Arc;

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Emits only the values for which `predicate` returns `true`.
pub struct Filter<T> {
    upstream: Arc<dyn Publisher<T>>,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: Send + 'static> Filter<T> {
    /// Wraps `upstream`, retaining only values matching `predicate`.
    pub fn new(
        upstream: Arc<dyn Publisher<T>>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            predicate: Box::new(predicate),
        })
    }
}

impl<T: Send + 'static> Publisher<T> for Filter<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(FilterSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            filter: self,
        });
        inner.filter.upstream.clone().subscribe(inner.clone());
    }
}

struct FilterSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    filter: Arc<Filter<T>>,
}

impl<T: Send + 'static> Subscriber<T> for FilterSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        if (self.filter.predicate)(&value) {
            self.downstream.on_next(value);
        } else {
            self.upstream.request(1);
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
    fn keeps_only_matching_values() {
        let values = collect(Filter::new(Range::new(1, 10), |x| x % 2 == 0));
        assert_eq!(values, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn predicate_true_is_identity() {
        let values = collect(Filter::new(Range::new(1, 5), |_| true));
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }
}
