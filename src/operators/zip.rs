//! `zip` (§4.8): combines N sources row-wise. Each source feeds its own
//! bounded queue; a single drain loop emits a tuple (as `Vec<T>`) only once
//! every queue holds at least one item, and the zip terminates as soon as
//! any source both empties its queue and signals completion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::backpressure::Demand;
use crate::drain::Wip;
use crate::queue::SpscQueue;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Configuration for [`Zip`] (§6 "zip: {sources, prefetch}").
#[derive(Clone, Copy)]
pub struct ZipConfig {
    /// Per-source queue capacity and initial request.
    pub prefetch: u64,
}

impl Default for ZipConfig {
    fn default() -> Self {
        Self { prefetch: 32 }
    }
}

/// Zips `sources` row-wise: the `n`th emitted `Vec<T>` holds the `n`th value
/// from every source, in source order.
pub struct Zip<T> {
    sources: Vec<Arc<dyn Publisher<T>>>,
    config: ZipConfig,
}

impl<T: Send + Clone + 'static> Zip<T> {
    /// Zips `sources`.
    pub fn new(sources: Vec<Arc<dyn Publisher<T>>>, config: ZipConfig) -> Arc<Self> {
        Arc::new(Self { sources, config })
    }
}

impl<T: Send + Clone + 'static> Publisher<Vec<T>> for Zip<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<Vec<T>>>) {
        let prefetch = self.config.prefetch.max(1);
        let lanes: Vec<Arc<Lane<T>>> = self
            .sources
            .iter()
            .map(|_| {
                Arc::new(Lane {
                    queue: SpscQueue::with_capacity(prefetch as usize),
                    upstream: Arc::new(UpstreamSlot::new()),
                    done: AtomicBool::new(false),
                    consumed: AtomicU64::new(0),
                })
            })
            .collect();
        let state = Arc::new(ZipState {
            downstream: subscriber,
            lanes,
            demand: Demand::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            prefetch,
        });
        if state.lanes.is_empty() {
            state
                .downstream
                .on_subscribe(Arc::new(crate::subscription::NoopSubscription));
            state.downstream.on_complete();
            return;
        }
        state
            .downstream
            .on_subscribe(Arc::new(ZipSubscription { state: state.clone() }));
        for (i, source) in self.sources.iter().enumerate() {
            source.clone().subscribe(Arc::new(LaneListener {
                state: state.clone(),
                index: i,
            }));
        }
    }
}

struct Lane<T> {
    queue: SpscQueue<T>,
    upstream: Arc<UpstreamSlot>,
    done: AtomicBool,
    consumed: AtomicU64,
}

struct ZipState<T> {
    downstream: Arc<dyn Subscriber<Vec<T>>>,
    lanes: Vec<Arc<Lane<T>>>,
    demand: Demand,
    wip: Wip,
    cancelled: AtomicBool,
    error: Mutex<Option<StreamError>>,
    prefetch: u64,
}

impl<T: Send + Clone + 'static> ZipState<T> {
    fn enter_and_drain(self: &Arc<Self>) {
        if self.wip.enter() {
            self.drain();
        }
    }

    fn clear_all(&self) {
        for lane in &self.lanes {
            while lane.queue.try_pop().is_some() {}
            lane.upstream.cancel();
        }
    }

    fn drain(self: &Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.clear_all();
                return;
            }

            if let Some(err) = self.error.lock().unwrap_or_else(|e| e.into_inner()).take() {
                self.clear_all();
                self.downstream.on_error(err);
                return;
            }

            let mut demand = self.demand.get();
            while demand > 0 {
                // A row is only ready once every lane has at least one item.
                let ready = self.lanes.iter().all(|lane| !lane.queue.is_empty());
                if !ready {
                    break;
                }
                let mut row = Vec::with_capacity(self.lanes.len());
                for lane in &self.lanes {
                    let value = lane.queue.try_pop().expect("checked non-empty above");
                    row.push(value);
                    let consumed = lane.consumed.fetch_add(1, Ordering::AcqRel) + 1;
                    let threshold = self.prefetch - self.prefetch / 4;
                    if consumed >= threshold.max(1) {
                        lane.consumed.fetch_sub(consumed, Ordering::AcqRel);
                        lane.upstream.request(consumed);
                    }
                }
                self.downstream.on_next(row);
                self.demand.consume(1);
                demand -= 1;
            }

            // Terminate once any lane is both drained and finished: no
            // further complete row can ever be produced.
            let exhausted = self
                .lanes
                .iter()
                .any(|lane| lane.queue.is_empty() && lane.done.load(Ordering::Acquire));
            if exhausted {
                self.clear_all();
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

struct LaneListener<T> {
    state: Arc<ZipState<T>>,
    index: usize,
}

impl<T: Send + Clone + 'static> Subscriber<T> for LaneListener<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let lane = &self.state.lanes[self.index];
        lane.upstream.set(subscription);
        lane.upstream.request(self.state.prefetch);
    }

    fn on_next(&self, value: T) {
        let lane = &self.state.lanes[self.index];
        if lane.queue.try_push(value).is_err() {
            *self.state.error.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(StreamError::QueueOverflow {
                    capacity: lane.queue.capacity(),
                });
        }
        self.state.enter_and_drain();
    }

    fn on_error(&self, error: StreamError) {
        *self.state.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
        self.state.enter_and_drain();
    }

    fn on_complete(&self) {
        self.state.lanes[self.index].done.store(true, Ordering::Release);
        self.state.enter_and_drain();
    }
}

struct ZipSubscription<T> {
    state: Arc<ZipState<T>>,
}

impl<T: Send + Clone + 'static> Subscription for ZipSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.state.demand.add(n);
        self.state.enter_and_drain();
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.enter_and_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn zips_sources_row_wise() {
        let rows = collect(Zip::new(
            vec![Range::new(1, 3), Range::new(10, 3)],
            ZipConfig::default(),
        ));
        assert_eq!(rows, vec![vec![1, 10], vec![2, 11], vec![3, 12]]);
    }

    #[test]
    fn zip_stops_at_the_shortest_source() {
        let rows = collect(Zip::new(
            vec![Range::new(1, 5), Range::new(10, 2)],
            ZipConfig::default(),
        ));
        assert_eq!(rows, vec![vec![1, 10], vec![2, 11]]);
    }
}
