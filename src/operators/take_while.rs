//! `take_while(predicate)`: emits values while `predicate` holds, then
//! cancels upstream and completes on the first failure (§1 Non-goals —
//! conforming instance). The failing value itself is not emitted.

use std::sync::Arc;

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Emits values until `predicate` first returns `false`.
pub struct TakeWhile<T> {
    upstream: Arc<dyn Publisher<T>>,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: Send + 'static> TakeWhile<T> {
    /// Wraps `upstream`, stopping at the first value failing `predicate`.
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

impl<T: Send + 'static> Publisher<T> for TakeWhile<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(TakeWhileSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            take_while: self,
        });
        inner.take_while.upstream.clone().subscribe(inner.clone());
    }
}

struct TakeWhileSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    take_while: Arc<TakeWhile<T>>,
}

impl<T: Send + 'static> Subscriber<T> for TakeWhileSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        if self.upstream.is_cancelled() {
            return;
        }
        if (self.take_while.predicate)(&value) {
            self.downstream.on_next(value);
        } else {
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
    fn stops_at_first_failure() {
        let values = collect(TakeWhile::new(Range::new(1, 10), |&x| x < 4));
        assert_eq!(values, vec![1, 2, 3]);
    }
}
