//! `flat_map` — dynamic fan-in (§4.6): maps each upstream value to an inner
//! publisher and merges up to `max_concurrency` concurrently subscribed
//! inners. `merge` (§4.9) reuses this exact drain/inner-queue/error
//! machinery with its source registry fixed at subscription time instead
//! of built lazily from outer emissions — see `merge.rs`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::StreamError;
use crate::backpressure::{Demand, UNBOUNDED};
use crate::drain::Wip;
use crate::queue::SpscQueue;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, UpstreamSlot, validate};

/// Configuration for [`FlatMap`] (§6 "flat-map: {max-concurrency, prefetch,
/// delay-errors}").
#[derive(Clone, Copy)]
pub struct FlatMapConfig {
    /// Maximum number of inner publishers subscribed concurrently.
    pub max_concurrency: usize,
    /// Prefetch issued to each inner publisher.
    pub prefetch: u64,
    /// Whether errors (outer or inner) are accumulated and surfaced at
    /// terminal instead of short-circuiting immediately.
    pub delay_errors: bool,
}

impl Default for FlatMapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            prefetch: 32,
            delay_errors: false,
        }
    }
}

/// Maps each upstream value to an inner [`Publisher`] via `mapper` and
/// merges their emissions, bounded by `config.max_concurrency` concurrently
/// active inners.
pub struct FlatMap<T, U> {
    upstream: Arc<dyn Publisher<T>>,
    mapper: Box<dyn Fn(T) -> Result<Arc<dyn Publisher<U>>, String> + Send + Sync>,
    config: FlatMapConfig,
}

impl<T: Send + 'static, U: Send + 'static> FlatMap<T, U> {
    /// Wraps `upstream`, flat-mapping each value through `mapper`.
    pub fn new(
        upstream: Arc<dyn Publisher<T>>,
        config: FlatMapConfig,
        mapper: impl Fn(T) -> Result<Arc<dyn Publisher<U>>, String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            mapper: Box::new(mapper),
            config,
        })
    }
}

impl<T: Send + 'static, U: Send + 'static> Publisher<U> for FlatMap<T, U> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<U>>) {
        let state = Arc::new(FanInState::new(subscriber, self.config));
        state.downstream.on_subscribe(Arc::new(FanInSubscription {
            state: state.clone(),
        }));
        self.upstream.clone().subscribe(Arc::new(OuterListener {
            state,
            mapper: self,
        }));
    }
}

struct OuterListener<T, U> {
    state: Arc<FanInState<U>>,
    mapper: Arc<FlatMap<T, U>>,
}

impl<T: Send + 'static, U: Send + 'static> Subscriber<T> for OuterListener<T, U> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.state.outer.set(subscription);
        self.state
            .outer
            .request(self.mapper.config.max_concurrency as u64);
    }

    fn on_next(&self, value: T) {
        match (self.mapper.mapper)(value) {
            Ok(publisher) => self.state.offer_inner(publisher),
            Err(message) => self.state.fail(StreamError::MapperFailed(message)),
        }
    }

    fn on_error(&self, error: StreamError) {
        self.state.outer_error(error);
    }

    fn on_complete(&self) {
        self.state.outer_complete();
    }
}

/// Shared fan-in machinery used by both `flat_map` and `merge`.
pub(crate) struct FanInState<U> {
    pub(crate) downstream: Arc<dyn Subscriber<U>>,
    pub(crate) outer: Arc<UpstreamSlot>,
    pub(crate) demand: Demand,
    pub(crate) wip: Wip,
    pub(crate) cancelled: AtomicBool,
    pub(crate) outer_done: AtomicBool,
    pub(crate) pending: Mutex<VecDeque<Arc<dyn Publisher<U>>>>,
    pub(crate) active: Mutex<Vec<Arc<InnerRecord<U>>>>,
    pub(crate) next_id: AtomicU64,
    pub(crate) max_concurrency: usize,
    pub(crate) prefetch: u64,
    pub(crate) delay_errors: bool,
    pub(crate) errors: Mutex<Vec<StreamError>>,
    pub(crate) error_flag: AtomicBool,
}

pub(crate) struct InnerRecord<U> {
    id: u64,
    queue: SpscQueue<U>,
    upstream: Arc<UpstreamSlot>,
    done: AtomicBool,
    consumed: AtomicU64,
    prefetch: u64,
}

impl<U: Send + 'static> FanInState<U> {
    pub(crate) fn new(downstream: Arc<dyn Subscriber<U>>, config: FlatMapConfig) -> Self {
        Self {
            downstream,
            outer: Arc::new(UpstreamSlot::new()),
            demand: Demand::new(),
            wip: Wip::new(),
            cancelled: AtomicBool::new(false),
            outer_done: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
            active: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            max_concurrency: config.max_concurrency.max(1),
            prefetch: config.prefetch.max(1),
            delay_errors: config.delay_errors,
            errors: Mutex::new(Vec::new()),
            error_flag: AtomicBool::new(false),
        }
    }

    /// Registers a freshly mapped inner publisher: subscribes it immediately
    /// if a slot is free, otherwise buffers it for later when `delay_errors`
    /// is set, or fails the whole operator when it isn't (§4.6).
    pub(crate) fn offer_inner(self: &Arc<Self>, publisher: Arc<dyn Publisher<U>>) {
        let has_slot = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.len() < self.max_concurrency
        };
        if has_slot {
            self.subscribe_inner(publisher);
        } else if self.delay_errors {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(publisher);
        } else {
            self.fail(StreamError::ProtocolViolation(format!(
                "flat-map concurrency limit of {} exceeded",
                self.max_concurrency
            )));
        }
    }

    fn subscribe_inner(self: &Arc<Self>, publisher: Arc<dyn Publisher<U>>) {
        let record = Arc::new(InnerRecord {
            id: self.next_id.fetch_add(1, Ordering::AcqRel),
            queue: SpscQueue::with_capacity(self.prefetch as usize),
            upstream: Arc::new(UpstreamSlot::new()),
            done: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
            prefetch: self.prefetch,
        });
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        let listener = Arc::new(InnerListener {
            state: Arc::downgrade(self),
            record,
        });
        publisher.subscribe(listener);
    }

    fn fail(self: &Arc<Self>, error: StreamError) {
        if self.delay_errors {
            self.errors.lock().unwrap_or_else(|e| e.into_inner()).push(error);
            self.error_flag.store(true, Ordering::Release);
            self.enter_and_drain();
        } else {
            self.error_flag.store(true, Ordering::Release);
            *self.errors.lock().unwrap_or_else(|e| e.into_inner()) = vec![error];
            self.cancelled.store(true, Ordering::Release);
            self.enter_and_drain();
        }
    }

    fn outer_error(self: &Arc<Self>, error: StreamError) {
        self.fail(error);
    }

    fn outer_complete(self: &Arc<Self>) {
        self.outer_done.store(true, Ordering::Release);
        self.enter_and_drain();
    }

    pub(crate) fn enter_and_drain(self: &Arc<Self>) {
        if self.wip.enter() {
            self.drain();
        }
    }

    fn clear_all(&self) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        for inner in active.iter() {
            while inner.queue.try_pop().is_some() {}
            inner.upstream.cancel();
        }
    }

    fn drain(self: &Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                self.clear_all();
                self.outer.cancel();
                if self.error_flag.load(Ordering::Acquire) {
                    self.emit_errors();
                }
                return;
            }

            let mut demand = self.demand.get();
            let mut progressed = true;
            while demand > 0 && progressed {
                progressed = false;
                let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).clone();
                for inner in active {
                    if demand == 0 {
                        break;
                    }
                    if let Some(value) = inner.queue.try_pop() {
                        self.downstream.on_next(value);
                        self.demand.consume(1);
                        demand -= 1;
                        progressed = true;
                        let consumed = inner.consumed.fetch_add(1, Ordering::AcqRel) + 1;
                        let threshold = inner.prefetch - inner.prefetch / 4;
                        if consumed >= threshold.max(1) {
                            inner.consumed.fetch_sub(consumed, Ordering::AcqRel);
                            inner.upstream.request(consumed);
                        }
                    } else if inner.done.load(Ordering::Acquire) {
                        self.retire_inner(inner.id);
                        progressed = true;
                    }
                }
            }

            if !self.delay_errors && self.error_flag.load(Ordering::Acquire) {
                self.clear_all();
                self.outer.cancel();
                self.emit_errors();
                return;
            }

            let all_idle = {
                let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
                active.is_empty()
            };
            let nothing_pending = self.pending.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
            if all_idle && nothing_pending && self.outer_done.load(Ordering::Acquire) {
                if self.error_flag.load(Ordering::Acquire) {
                    self.emit_errors();
                } else {
                    self.downstream.on_complete();
                }
                return;
            }

            missed = self.wip.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }

    fn emit_errors(&self) {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        let mut drained = errors.drain(..);
        if let Some(first) = drained.next() {
            let combined = drained.fold(first, StreamError::combine);
            self.downstream.on_error(combined);
        }
    }

    fn retire_inner(self: &Arc<Self>, id: u64) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| r.id != id);
        let next = self.pending.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(publisher) => self.subscribe_inner(publisher),
            None => self.outer.request(1),
        }
    }
}

struct InnerListener<U> {
    state: Weak<FanInState<U>>,
    record: Arc<InnerRecord<U>>,
}

impl<U: Send + 'static> Subscriber<U> for InnerListener<U> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.record.upstream.set(subscription);
        self.record.upstream.request(self.record.prefetch);
    }

    fn on_next(&self, value: U) {
        if self.record.queue.try_push(value).is_err() {
            if let Some(state) = self.state.upgrade() {
                state.fail(StreamError::QueueOverflow {
                    capacity: self.record.queue.capacity(),
                });
            }
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.enter_and_drain();
        }
    }

    fn on_error(&self, error: StreamError) {
        if let Some(state) = self.state.upgrade() {
            state.fail(error);
        }
    }

    fn on_complete(&self) {
        self.record.done.store(true, Ordering::Release);
        if let Some(state) = self.state.upgrade() {
            state.enter_and_drain();
        }
    }
}

pub(crate) struct FanInSubscription<U> {
    state: Arc<FanInState<U>>,
}

impl<U: Send + 'static> FanInSubscription<U> {
    pub(crate) fn new(state: Arc<FanInState<U>>) -> Self {
        Self { state }
    }
}

impl<U: Send + 'static> Subscription for FanInSubscription<U> {
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
    fn serialized_single_concurrency_matches_scenario() {
        // flat_map(range(1,3), x => range(x, 2), max_concurrency=1) §8 scenario 3.
        let values = collect(FlatMap::new(
            Range::new(1, 3),
            FlatMapConfig {
                max_concurrency: 1,
                prefetch: 32,
                delay_errors: false,
            },
            |x| Ok(Range::new(x, 2) as Arc<dyn Publisher<i64>>),
        ));
        assert_eq!(values, vec![1, 2, 2, 3, 3, 4]);
    }

    #[test]
    fn mapper_failure_signals_error() {
        let downstream = crate::subscriber::TestSubscriber::<i64>::new(UNBOUNDED);
        Publisher::subscribe(
            FlatMap::new(
                Range::new(1, 3),
                FlatMapConfig::default(),
                |_x| Err::<Arc<dyn Publisher<i64>>, _>("boom".to_string()),
            ),
            downstream.clone(),
        );
        downstream.wait_for_terminal();
        assert!(downstream.error().is_some());
    }
}
