//! `scan`: stateful one-to-one accumulation (§8 "scan(z, f).last() ==
//! reduce(z, f)"). Same demand shape as `map` — exactly one downstream
//! emission per upstream emission — so the upstream subscription is
//! forwarded unmodified.

use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::error::{DroppedSignal, report_dropped};
use crate::signal::{Publisher, Subscriber};
use crate::subscription::Subscription;

/// Emits `seed`, then `f(acc, x)` for every subsequent upstream value,
/// replacing `acc` each time.
pub struct Scan<T, U> {
    upstream: Arc<dyn Publisher<T>>,
    seed: U,
    f: Box<dyn Fn(&U, T) -> U + Send + Sync>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> Scan<T, U> {
    /// Wraps `upstream`, accumulating from `seed` with `f`.
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

impl<T: Send + 'static, U: Clone + Send + 'static> Publisher<U> for Scan<T, U> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<U>>) {
        let inner = Arc::new(ScanSubscriber {
            downstream: subscriber,
            acc: Mutex::new(self.seed.clone()),
            state: Mutex::new(None),
            scan: self,
        });
        inner.scan.upstream.clone().subscribe(inner.clone());
    }
}

struct ScanSubscriber<T, U> {
    downstream: Arc<dyn Subscriber<U>>,
    acc: Mutex<U>,
    state: Mutex<Option<Arc<dyn Subscription>>>,
    scan: Arc<Scan<T, U>>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> Subscriber<T> for ScanSubscriber<T, U> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        let mut acc = self.acc.lock().unwrap_or_else(|e| e.into_inner());
        *acc = (self.scan.f)(&acc, value);
        self.downstream.on_next(acc.clone());
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
    fn running_sum() {
        let values = collect(Scan::new(Range::new(1, 4), 0i64, |acc, x| acc + x));
        assert_eq!(values, vec![1, 3, 6, 10]);
    }
}
