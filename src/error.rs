//! Error taxonomy (§7) and the process-wide drop sink (§6).

use std::fmt;
use std::sync::OnceLock;

use tracing::warn;

/// Errors that can terminate a subscription downstream.
///
/// Mirrors the taxonomy in §7: user-code failures, protocol violations,
/// queue overflow, and the composite form used by `delay_errors` operators.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A mapper, predicate, key-extractor, or buffer-supplier panicked or
    /// returned an error.
    #[error("user callback failed: {0}")]
    MapperFailed(String),

    /// A mapper, predicate, or supplier produced a null/`None` value where
    /// the protocol requires one.
    #[error("user callback produced a null value")]
    NullValue,

    /// A bounded internal queue rejected an offer (`try_push` returned
    /// `Err`) because the producer outran prefetch/replenishment.
    #[error("internal queue overflow (capacity {capacity})")]
    QueueOverflow {
        /// Capacity of the queue that overflowed.
        capacity: usize,
    },

    /// `request(n)` was called with `n <= 0`, or a double-subscribe was
    /// attempted, or a signal arrived out of protocol order.
    #[error("reactive-streams protocol violation: {0}")]
    ProtocolViolation(String),

    /// A scheduler refused a unit of work (`Scheduler::schedule` returned
    /// the rejected sentinel).
    #[error("scheduler rejected work: {0}")]
    SchedulerRejected(String),

    /// Multiple errors accumulated by a `delay_errors` operator, surfaced
    /// together at terminal.
    #[error("{} errors occurred", .0.len())]
    Composite(Vec<StreamError>),
}

impl StreamError {
    /// Combines `self` with `other` into a [`StreamError::Composite`],
    /// flattening nested composites so repeated folding stays linear.
    pub fn combine(self, other: StreamError) -> StreamError {
        let mut errors = match self {
            StreamError::Composite(v) => v,
            other => vec![other],
        };
        match other {
            StreamError::Composite(v) => errors.extend(v),
            e => errors.push(e),
        }
        StreamError::Composite(errors)
    }
}

/// A dropped terminal signal: one that could not be delivered because the
/// subscriber had already reached a terminal state (§7 "Errors arriving
/// after terminal are sent to the process-wide sink").
#[derive(Debug)]
pub enum DroppedSignal {
    /// An error arrived after the subscriber was already terminated.
    ErrorAfterTerminal(StreamError),
    /// A protocol violation was observed (non-positive request, double
    /// subscribe, emission after terminal).
    ProtocolViolation(String),
}

impl fmt::Display for DroppedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroppedSignal::ErrorAfterTerminal(e) => {
                write!(f, "error dropped after terminal: {e}")
            }
            DroppedSignal::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
        }
    }
}

/// A process-wide callback for signals that cannot be delivered to any
/// subscriber (§6 "Error sink").
pub trait ErrorSink: Send + Sync {
    /// Called with every dropped signal. Must not panic.
    fn on_dropped(&self, signal: DroppedSignal);
}

struct TracingSink;

impl ErrorSink for TracingSink {
    fn on_dropped(&self, signal: DroppedSignal) {
        warn!(%signal, "reactive-streams signal dropped");
    }
}

static ERROR_SINK: OnceLock<Box<dyn ErrorSink>> = OnceLock::new();

/// Installs the process-wide error sink. Only the first call takes effect;
/// subsequent calls are ignored, matching the "configurable function
/// pointer set at initialization" design in §9.
pub fn set_error_sink(sink: Box<dyn ErrorSink>) {
    let _ = ERROR_SINK.set(sink);
}

fn sink() -> &'static dyn ErrorSink {
    ERROR_SINK.get_or_init(|| Box::new(TracingSink)).as_ref()
}

/// Reports a signal that could not be delivered anywhere.
pub(crate) fn report_dropped(signal: DroppedSignal) {
    sink().on_dropped(signal);
}
