//! `from_iter`: a source publisher over any `Send`-able iterator (§13 of
//! SPEC_FULL.md). Used by tests to drive `concat`/`zip`/`merge` without
//! hand-writing a `Subscriber` per fixture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::drain::Wip;
use crate::backpressure::Demand;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, validate};

/// Wraps a `Vec<T>` as a one-shot, backpressure-respecting publisher.
pub struct FromIter<T> {
    items: Mutex<Option<Vec<T>>>,
}

impl<T: Send + 'static> FromIter<T> {
    /// Builds a publisher emitting every item of `items`, in order.
    pub fn new(items: impl IntoIterator<Item = T>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Some(items.into_iter().collect())),
        })
    }
}

impl<T: Send + 'static> Publisher<T> for FromIter<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let items = self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();
        let sub = Arc::new(IterSubscription {
            items: Mutex::new(items.into_iter()),
            demand: Demand::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            downstream: subscriber.clone(),
        });
        subscriber.on_subscribe(sub);
    }
}

struct IterSubscription<T> {
    items: Mutex<std::vec::IntoIter<T>>,
    demand: Demand,
    wip: Wip,
    cancelled: AtomicBool,
    downstream: Arc<dyn Subscriber<T>>,
}

impl<T: Send + 'static> Subscription for IterSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.demand.add(n);
        if self.wip.enter() {
            self.drain();
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl<T: Send + 'static> IterSubscription<T> {
    fn drain(&self) {
        let mut missed = 1u32;
        loop {
            let mut demand = self.demand.get();
            let mut emitted = 0u64;
            while demand > 0 {
                if self.cancelled.load(Ordering::Acquire) {
                    return;
                }
                let next = self.items.lock().unwrap_or_else(|e| e.into_inner()).next();
                match next {
                    Some(value) => {
                        self.downstream.on_next(value);
                        emitted += 1;
                        demand -= 1;
                    }
                    None => {
                        self.downstream.on_complete();
                        return;
                    }
                }
            }
            if emitted > 0 {
                self.demand.consume(emitted);
            }
            missed = self.wip.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::collect;

    #[test]
    fn emits_every_item_in_order() {
        let values = collect(FromIter::new(vec!["a", "b", "c"]));
        assert_eq!(values, vec!["a", "b", "c"]);
    }
}
