//! The six concrete scenarios of §8 in `spec.md`, driven end-to-end through
//! `rxcore`'s public API. These are black-box integration checks — the
//! inline `#[cfg(test)]` modules next to each operator already cover the
//! same scenarios white-box (with access to operator-internal scaffolding
//! like `FanInState`), so this file exists only to prove the assembled
//! public surface behaves the same way a library consumer would observe.

use std::sync::{Arc, Once};

use rxcore::StreamError;
use rxcore::operators::{Buffer, BufferConfig, Concat, FlatMap, FlatMapConfig, Map, ObserveOn, ObserveOnConfig};
use rxcore::processor::Processor;
use rxcore::scheduler::{CancelHandle, Scheduler};
use rxcore::signal::{Publisher, Subscriber};
use rxcore::source::Range;
use rxcore::subscriber::{TestSubscriber, collect};

static TRACING_INIT: Once = Once::new();

/// Surfaces `tracing` output (drain entry/exit, scheduler rejections) on
/// test failure; harmless if a subscriber is already installed.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

struct InlineHandle;
impl CancelHandle for InlineHandle {
    fn run(&self) {}
}

/// Runs every scheduled task synchronously on the calling thread.
struct Inline;
impl Scheduler for Inline {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) -> Result<Arc<dyn CancelHandle>, StreamError> {
        task();
        Ok(Arc::new(InlineHandle))
    }
}

#[test]
fn scenario_1_range_map_collect() {
    let values = collect(Map::new(Range::new(1, 5), |x| Ok(x * 10)));
    assert_eq!(values, vec![10, 20, 30, 40, 50]);
}

#[test]
fn scenario_2_concat_array() {
    let values = collect(Concat::new(vec![Range::new(1, 3), Range::new(10, 2)], false));
    assert_eq!(values, vec![1, 2, 3, 10, 11]);
}

#[test]
fn scenario_3_flat_map_serialized_inner_order() {
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
fn scenario_4_buffer_tiles_the_source() {
    let values = collect(Buffer::new(Range::new(1, 10), BufferConfig::exact(3)));
    assert_eq!(
        values,
        vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]
    );
}

#[test]
fn scenario_5_observe_on_batched_requests() {
    init_tracing();
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

#[test]
fn scenario_6_multicast_processor_removes_slow_subscriber() {
    let processor = Processor::<i64>::new();

    let slow = TestSubscriber::<i64>::new(2);
    Publisher::subscribe(processor.clone(), slow.clone());
    let fast = TestSubscriber::<i64>::new(rxcore::backpressure::UNBOUNDED);
    Publisher::subscribe(processor.clone(), fast.clone());

    processor.on_next(1);
    processor.on_next(2);
    processor.on_next(3);
    processor.on_complete();

    fast.wait_for_terminal();
    assert_eq!(fast.values(), vec![1, 2, 3]);
    assert!(fast.error().is_none());

    assert_eq!(slow.values(), vec![1, 2]);
    assert!(slow.error().is_some());
}
