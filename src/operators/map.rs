//! `map`: a stateless, one-to-one transform (§1 Non-goals — named as a
//! conforming instance, minimal implementation). Since each upstream item
//! produces exactly one downstream item, the upstream subscription can be
//! handed to the downstream unmodified: demand bookkeeping is identical on
//! both sides of the transform.

use std::sync::Arc;

use crate::StreamError;
use crate::error::{DroppedSignal, report_dropped};
use crate::signal::{Publisher, Subscriber};
use crate::subscription::Subscription;

/// Applies `f` to every value. If `f` returns `Err`, cancels upstream and
/// signals the error downstream (§3 "mapper-fatal").
pub struct Map<T, U> {
    upstream: Arc<dyn Publisher<T>>,
    f: Box<dyn Fn(T) -> Result<U, String> + Send + Sync>,
}

impl<T: Send + 'static, U: Send + 'static> Map<T, U> {
    /// Wraps `upstream`, transforming each value with `f`.
    pub fn new(
        upstream: Arc<dyn Publisher<T>>,
        f: impl Fn(T) -> Result<U, String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            f: Box::new(f),
        })
    }
}

impl<T: Send + 'static, U: Send + 'static> Publisher<U> for Map<T, U> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<U>>) {
        let inner = Arc::new(MapSubscriber {
            downstream: subscriber,
            state: Arc::new(std::sync::Mutex::new(None)),
            map: self,
        });
        inner.map.upstream.clone().subscribe(inner.clone());
    }
}

struct MapSubscriber<T, U> {
    downstream: Arc<dyn Subscriber<U>>,
    state: Arc<std::sync::Mutex<Option<Arc<dyn Subscription>>>>,
    map: Arc<Map<T, U>>,
}

impl<T: Send + 'static, U: Send + 'static> Subscriber<T> for MapSubscriber<T, U> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        match (self.map.f)(value) {
            Ok(mapped) => self.downstream.on_next(mapped),
            Err(message) => {
                if let Some(sub) = self.state.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    sub.cancel();
                }
                self.downstream.on_error(StreamError::MapperFailed(message));
            }
        }
    }

    fn on_error(&self, error: StreamError) {
        if self.state.lock().unwrap_or_else(|e| e.into_inner()).take().is_none() {
            report_dropped(DroppedSignal::ErrorAfterTerminal(error));
            return;
        }
        self.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.state.lock().unwrap_or_else(|e| e.into_inner()).take().is_some() {
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
    fn doubles_every_value() {
        let values = collect(Map::new(Range::new(1, 5), |x| Ok(x * 2)));
        assert_eq!(values, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn identity_mapper_is_identity_on_traces() {
        let values = collect(Map::new(Range::new(1, 5), Ok));
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn range_map_collect_matches_scenario() {
        // §8 scenario 1.
        let values = collect(Map::new(Range::new(1, 5), |x| Ok(x * 10)));
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }
}
