//! `timer` / `interval` (§4.11): scheduler-driven sources. `timer` emits a
//! single tick after `delay` then completes; `interval` emits an
//! incrementing counter every `period` until cancelled. Both install their
//! pending scheduled work through the "install cancel-handle" CAS idiom
//! (§9) so a race between firing and cancellation never double-runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::StreamError;
use crate::backpressure::Demand;
use crate::drain::Wip;
use crate::scheduler::{CancelHandle, CancelSlot, TimeScheduler};
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, validate};

/// Ticks allowed to accumulate before a lagging downstream is errored
/// instead of letting `pending_ticks` grow without bound (§4.11).
const MAX_PENDING_TICKS: u64 = 1;

/// Configuration for [`Timer`] (§6 "timer: {delay, time-unit, scheduler}").
#[derive(Clone)]
pub struct TimerConfig {
    /// Delay before the single emission.
    pub delay: Duration,
    /// Executor the delayed task runs on.
    pub scheduler: Arc<dyn TimeScheduler>,
}

/// Emits `0u64` once, after `config.delay`, then completes.
pub struct Timer {
    config: TimerConfig,
}

impl Timer {
    /// Creates a timer firing after `config.delay`.
    pub fn new(config: TimerConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }
}

impl Publisher<u64> for Timer {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<u64>>) {
        let state = Arc::new(TimerState {
            downstream: subscriber,
            demand: Demand::new(),
            wip: Wip::new(),
            cancel_slot: CancelSlot::new(),
            cancelled: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            emitted: AtomicBool::new(false),
        });
        state
            .downstream
            .on_subscribe(Arc::new(TimerSubscription { state: state.clone() }));
        let task_state = state.clone();
        let handle = self
            .config
            .scheduler
            .schedule_after(Box::new(move || task_state.fire()), self.config.delay);
        state.cancel_slot.install(handle);
    }
}

struct TimerState {
    downstream: Arc<dyn Subscriber<u64>>,
    demand: Demand,
    wip: Wip,
    cancel_slot: CancelSlot,
    cancelled: AtomicBool,
    fired: AtomicBool,
    emitted: AtomicBool,
}

impl TimerState {
    fn fire(self: &Arc<Self>) {
        self.fired.store(true, Ordering::Release);
        self.enter_and_drain();
    }

    fn enter_and_drain(self: &Arc<Self>) {
        if self.wip.enter() {
            self.drain();
        }
    }

    fn drain(self: &Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            if self.fired.load(Ordering::Acquire)
                && self.demand.get() > 0
                && !self.emitted.swap(true, Ordering::AcqRel)
            {
                self.downstream.on_next(0);
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

struct TimerSubscription {
    state: Arc<TimerState>,
}

impl Subscription for TimerSubscription {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.state.demand.add(n);
        self.state.enter_and_drain();
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.cancel_slot.cancel();
    }
}

/// Configuration for [`Interval`].
#[derive(Clone)]
pub struct IntervalConfig {
    /// Delay between consecutive emissions.
    pub period: Duration,
    /// Executor the recurring task runs on.
    pub scheduler: Arc<dyn TimeScheduler>,
}

/// Emits `0, 1, 2, …` every `config.period`, forever, until cancelled.
pub struct Interval {
    config: IntervalConfig,
}

impl Interval {
    /// Creates an interval ticking every `config.period`.
    pub fn new(config: IntervalConfig) -> Arc<Self> {
        Arc::new(Self { config })
    }
}

impl Publisher<u64> for Interval {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<u64>>) {
        let state = Arc::new(IntervalState {
            downstream: subscriber,
            demand: Demand::new(),
            wip: Wip::new(),
            pending_ticks: AtomicU64::new(0),
            next_value: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            period: self.config.period,
            scheduler: self.config.scheduler.clone(),
            handle: Mutex::new(None),
        });
        state
            .downstream
            .on_subscribe(Arc::new(IntervalSubscription { state: state.clone() }));
        IntervalState::schedule_next(&state);
    }
}

struct IntervalState {
    downstream: Arc<dyn Subscriber<u64>>,
    demand: Demand,
    wip: Wip,
    pending_ticks: AtomicU64,
    next_value: AtomicU64,
    cancelled: AtomicBool,
    error: Mutex<Option<StreamError>>,
    period: Duration,
    scheduler: Arc<dyn TimeScheduler>,
    handle: Mutex<Option<Arc<dyn CancelHandle>>>,
}

impl IntervalState {
    fn schedule_next(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let task_state = self.clone();
        let handle = self
            .scheduler
            .schedule_after(Box::new(move || task_state.on_tick()), self.period);
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn on_tick(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if self.pending_ticks.load(Ordering::Acquire) >= MAX_PENDING_TICKS {
            // Downstream hasn't kept up with even the previous tick; per
            // §4.11 this is a demand-lag error, not an unbounded backlog.
            *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(StreamError::ProtocolViolation(
                "interval ticked again before downstream consumed the previous value".to_string(),
            ));
            self.enter_and_drain();
            return;
        }
        self.pending_ticks.fetch_add(1, Ordering::AcqRel);
        self.enter_and_drain();
        self.schedule_next();
    }

    fn enter_and_drain(self: &Arc<Self>) {
        if self.wip.enter() {
            self.drain();
        }
    }

    fn drain(self: &Arc<Self>) {
        let mut missed = 1u32;
        loop {
            if let Some(err) = self.error.lock().unwrap_or_else(|e| e.into_inner()).take() {
                self.cancelled.store(true, Ordering::Release);
                self.downstream.on_error(err);
                return;
            }
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            let mut demand = self.demand.get();
            while demand > 0 {
                let had_tick = self
                    .pending_ticks
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                        if t > 0 { Some(t - 1) } else { None }
                    })
                    .is_ok();
                if !had_tick {
                    break;
                }
                let value = self.next_value.fetch_add(1, Ordering::AcqRel);
                self.downstream.on_next(value);
                self.demand.consume(1);
                demand -= 1;
            }
            missed = self.wip.leave(missed);
            if missed == 0 {
                return;
            }
        }
    }
}

struct IntervalSubscription {
    state: Arc<IntervalState>,
}

impl Subscription for IntervalSubscription {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        self.state.demand.add(n);
        self.state.enter_and_drain();
    }

    fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.state.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamError;
    use crate::subscriber::collect;

    struct ImmediateHandle;
    impl CancelHandle for ImmediateHandle {
        fn run(&self) {}
    }

    /// Runs scheduled/delayed work synchronously, inline — enough to drive
    /// `Timer`/`Interval` deterministically in tests without real time.
    struct Immediate;
    impl crate::scheduler::Scheduler for Immediate {
        fn schedule(
            &self,
            task: Box<dyn FnOnce() + Send>,
        ) -> Result<Arc<dyn CancelHandle>, StreamError> {
            task();
            Ok(Arc::new(ImmediateHandle))
        }
    }
    impl TimeScheduler for Immediate {
        fn schedule_after(
            &self,
            task: Box<dyn FnOnce() + Send>,
            _delay: Duration,
        ) -> Arc<dyn CancelHandle> {
            task();
            Arc::new(ImmediateHandle)
        }
    }

    #[test]
    fn timer_fires_once_then_completes() {
        let values = collect(Timer::new(TimerConfig {
            delay: Duration::from_millis(1),
            scheduler: Arc::new(Immediate),
        }));
        assert_eq!(values, vec![0]);
    }

    #[test]
    fn interval_errors_when_ticks_outpace_consumption() {
        use crate::subscriber::TestSubscriber;

        // A subscriber that never requests anything lets ticks pile up
        // past `MAX_PENDING_TICKS`, which must error rather than grow
        // `pending_ticks` without bound.
        let downstream = TestSubscriber::<u64>::new(0);
        Publisher::subscribe(
            Interval::new(IntervalConfig {
                period: Duration::from_millis(1),
                scheduler: Arc::new(Immediate),
            }),
            downstream.clone(),
        );
        downstream.wait_for_terminal();
        assert!(downstream.error().is_some());
        assert!(downstream.values().is_empty());
    }
}
