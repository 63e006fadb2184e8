//! `observe_on` — hands upstream emissions off to a scheduler-bound worker
//! so downstream observation happens on a different execution context
//! (§4.5).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::backpressure::Demand;
use crate::drain::Wip;
use crate::queue::SpscQueue;
use crate::scheduler::Scheduler;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Configuration for [`ObserveOn`] (§12 of SPEC_FULL.md).
#[derive(Clone)]
pub struct ObserveOnConfig {
    /// Queue capacity and the initial request issued to upstream.
    pub prefetch: u64,
    /// If `false`, an upstream error short-circuits any buffered values
    /// still sitting in the queue; if `true`, buffered values drain first.
    pub delay_error: bool,
}

impl Default for ObserveOnConfig {
    fn default() -> Self {
        Self {
            prefetch: 32,
            delay_error: false,
        }
    }
}

/// Decouples upstream emission from downstream delivery via a bounded
/// queue drained on `scheduler`.
pub struct ObserveOn<T> {
    upstream: Arc<dyn Publisher<T>>,
    scheduler: Arc<dyn Scheduler>,
    config: ObserveOnConfig,
}

impl<T: Send + 'static> ObserveOn<T> {
    /// Wraps `upstream`, draining it on `scheduler` per `config`.
    pub fn new(
        upstream: Arc<dyn Publisher<T>>,
        scheduler: Arc<dyn Scheduler>,
        config: ObserveOnConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            scheduler,
            config,
        })
    }
}

impl<T: Send + 'static> Publisher<T> for ObserveOn<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let prefetch = self.config.prefetch.max(1);
        let state = Arc::new(ObserveOnState {
            queue: SpscQueue::with_capacity(prefetch as usize),
            demand: Demand::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            completed: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
            prefetch,
            delay_error: self.config.delay_error,
            downstream: subscriber,
            upstream: Arc::new(UpstreamSlot::new()),
            scheduler: self.scheduler.clone(),
        });
        let downstream_subscription: Arc<dyn Subscription> = Arc::new(ObserveOnSubscription {
            state: state.clone(),
        });
        state.downstream.on_subscribe(downstream_subscription);
        // A thin wrapper owns the `Arc<ObserveOnState>` needed to schedule
        // drains from a `&self` trait method, without `ObserveOnState`
        // holding a reference to itself.
        self.upstream
            .clone()
            .subscribe(Arc::new(UpstreamListener { state }));
    }
}

struct UpstreamListener<T> {
    state: Arc<ObserveOnState<T>>,
}

impl<T: Send + 'static> Subscriber<T> for UpstreamListener<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.state.upstream.set(subscription);
        self.state.upstream.request(self.state.prefetch);
    }

    fn on_next(&self, value: T) {
        if self.state.queue.try_push(value).is_err() {
            *self.state.error.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(StreamError::QueueOverflow {
                    capacity: self.state.queue.capacity(),
                });
        }
        self.state.schedule_drain();
    }

    fn on_error(&self, error: StreamError) {
        *self.state.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
        self.state.schedule_drain();
    }

    fn on_complete(&self) {
        self.state.completed.store(true, Ordering::Release);
        self.state.schedule_drain();
    }
}

struct ObserveOnState<T> {
    queue: SpscQueue<T>,
    demand: Demand,
    wip: Wip,
    cancelled: AtomicBool,
    error: Mutex<Option<StreamError>>,
    completed: AtomicBool,
    consumed: AtomicU64,
    prefetch: u64,
    delay_error: bool,
    downstream: Arc<dyn Subscriber<T>>,
    upstream: Arc<UpstreamSlot>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T: Send + 'static> ObserveOnState<T> {
    fn schedule_drain(self: &Arc<Self>) {
        if !self.wip.enter() {
            return;
        }
        let this = self.clone();
        if let Err(e) = self.scheduler.schedule(Box::new(move || this.drain())) {
            self.downstream
                .on_error(StreamError::SchedulerRejected(e.to_string()));
        }
    }

    fn clear_queue(&self) {
        while self.queue.try_pop().is_some() {}
    }

    fn drain(self: Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.clear_queue();
                self.upstream.cancel();
                return;
            }

            if !self.delay_error {
                let maybe_error = self.error.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(err) = maybe_error {
                    self.clear_queue();
                    self.downstream.on_error(err);
                    return;
                }
            }

            let mut demand = self.demand.get();
            let mut emitted = 0u64;
            while demand > 0 {
                if self.cancelled.load(Ordering::Acquire) {
                    self.clear_queue();
                    self.upstream.cancel();
                    return;
                }
                match self.queue.try_pop() {
                    Some(value) => {
                        self.downstream.on_next(value);
                        emitted += 1;
                        demand -= 1;
                    }
                    None => break,
                }
            }

            if emitted > 0 {
                self.demand.consume(emitted);
                let consumed = self.consumed.fetch_add(emitted, Ordering::AcqRel) + emitted;
                let threshold = self.prefetch - self.prefetch / 4;
                if consumed >= threshold {
                    self.consumed.fetch_sub(consumed, Ordering::AcqRel);
                    self.upstream.request(consumed);
                }
            }

            if self.queue.is_empty() {
                if self.delay_error {
                    let maybe_error = self.error.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(err) = maybe_error {
                        self.downstream.on_error(err);
                        return;
                    }
                }
                if self.completed.load(Ordering::Acquire) {
                    self.downstream.on_complete();
                    return;
                }
            }

            missed = self.wip.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

struct ObserveOnSubscription<T> {
    state: Arc<ObserveOnState<T>>,
}

impl<T: Send + 'static> Subscription for ObserveOnSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.state.demand.add(n);
        self.state.schedule_drain();
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.schedule_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::CancelHandle;
    use crate::source::Range;
    use crate::subscriber::collect;

    struct Inline;

    struct InlineHandle;
    impl CancelHandle for InlineHandle {
        fn run(&self) {}
    }

    impl Scheduler for Inline {
        fn schedule(
            &self,
            task: Box<dyn FnOnce() + Send>,
        ) -> Result<Arc<dyn CancelHandle>, StreamError> {
            task();
            Ok(Arc::new(InlineHandle))
        }
    }

    #[test]
    fn relays_every_value_in_order() {
        let values = collect(ObserveOn::new(
            Range::new(1, 1000),
            Arc::new(Inline),
            ObserveOnConfig {
                prefetch: 32,
                delay_error: false,
            },
        ));
        assert_eq!(values.len(), 1000);
        assert_eq!(values, (1..=1000).collect::<Vec<_>>());
    }

    #[test]
    fn batched_requests_of_ten_still_see_every_value_exactly_once() {
        // §8 scenario 5.
        use crate::subscriber::TestSubscriber;

        let downstream = TestSubscriber::<i64>::new(10);
        Publisher::subscribe(
            ObserveOn::new(
                Range::new(1, 1000),
                Arc::new(Inline),
                ObserveOnConfig {
                    prefetch: 32,
                    delay_error: false,
                },
            ),
            downstream.clone(),
        );
        while downstream.values().len() < 1000 {
            downstream.request_more(10);
        }
        downstream.wait_for_terminal();
        assert_eq!(downstream.values(), (1..=1000).collect::<Vec<_>>());
        assert!(downstream.error().is_none());
    }
}
