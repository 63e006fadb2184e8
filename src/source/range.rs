//! A source publisher emitting a contiguous run of `i64`s (§8 scenario 1).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use crate::backpressure::Demand;
use crate::drain::Wip;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, validate};

/// `range(start, count)`: emits `start, start + 1, ..., start + count - 1`
/// then completes. A conforming, backpressure-respecting source — each
/// `request(n)` drives the drain loop to emit up to `n` further values.
pub struct Range {
    start: i64,
    count: u64,
}

impl Range {
    /// Creates a range source. `count == 0` completes immediately on
    /// subscribe without emitting.
    pub fn new(start: i64, count: u64) -> Arc<Self> {
        Arc::new(Self { start, count })
    }
}

impl Publisher<i64> for Range {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<i64>>) {
        let sub = Arc::new(RangeSubscription {
            current: AtomicI64::new(self.start),
            remaining: AtomicU64::new(self.count),
            demand: Demand::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            downstream: subscriber.clone(),
        });
        subscriber.on_subscribe(sub);
    }
}

struct RangeSubscription {
    current: AtomicI64,
    remaining: AtomicU64,
    demand: Demand,
    wip: Wip,
    cancelled: AtomicBool,
    downstream: Arc<dyn Subscriber<i64>>,
}

impl Subscription for RangeSubscription {
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

impl RangeSubscription {
    fn drain(&self) {
        let mut missed = 1u32;
        loop {
            let mut demand = self.demand.get();
            let mut emitted = 0u64;
            while demand > 0 {
                if self.cancelled.load(Ordering::Acquire) {
                    return;
                }
                let remaining = self.remaining.load(Ordering::Relaxed);
                if remaining == 0 {
                    self.downstream.on_complete();
                    return;
                }
                let value = self.current.fetch_add(1, Ordering::Relaxed);
                self.remaining.store(remaining - 1, Ordering::Relaxed);
                self.downstream.on_next(value);
                emitted += 1;
                demand -= 1;
            }
            if emitted > 0 {
                self.demand.consume(emitted);
            }
            if !self.cancelled.load(Ordering::Acquire) && self.remaining.load(Ordering::Relaxed) == 0
            {
                self.downstream.on_complete();
                return;
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
    fn emits_requested_range_in_order() {
        let values = collect(Range::new(1, 5));
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_range_completes_immediately() {
        let values = collect(Range::new(0, 0));
        assert!(values.is_empty());
    }
}
