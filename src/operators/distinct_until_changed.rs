//! `distinct_until_changed`: drops a value equal to the immediately
//! preceding one (§8 "on `[1,1,2,2,1]` yields `[1,2,1]`"). As with
//! `filter`, a dropped value still costs one unit of upstream demand, so
//! one replacement unit is requested from upstream per drop.

use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot};

/// Drops consecutive duplicate values, comparing with `PartialEq`.
pub struct DistinctUntilChanged<T> {
    upstream: Arc<dyn Publisher<T>>,
}

impl<T: Send + PartialEq + Clone + 'static> DistinctUntilChanged<T> {
    /// Wraps `upstream`, suppressing consecutive duplicates.
    pub fn new(upstream: Arc<dyn Publisher<T>>) -> Arc<Self> {
        Arc::new(Self { upstream })
    }
}

impl<T: Send + PartialEq + Clone + 'static> Publisher<T> for DistinctUntilChanged<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = Arc::new(DistinctSubscriber {
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            last: Mutex::new(None),
        });
        self.upstream.clone().subscribe(inner);
    }
}

struct DistinctSubscriber<T> {
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    last: Mutex<Option<T>>,
}

impl<T: Send + PartialEq + Clone + 'static> Subscriber<T> for DistinctSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.upstream.set(subscription);
        let downstream_subscription: Arc<dyn Subscription> = self.upstream.clone();
        self.downstream.on_subscribe(downstream_subscription);
    }

    fn on_next(&self, value: T) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(&value) {
            drop(last);
            self.upstream.request(1);
            return;
        }
        *last = Some(value.clone());
        drop(last);
        self.downstream.on_next(value);
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
    use crate::source::FromIter;
    use crate::subscriber::collect;

    #[test]
    fn collapses_consecutive_duplicates() {
        let values = collect(DistinctUntilChanged::new(FromIter::new(vec![1, 1, 2, 2, 1])));
        assert_eq!(values, vec![1, 2, 1]);
    }
}
