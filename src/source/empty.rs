//! Trivial sources: `empty`, `once`, and `error` (§13 of SPEC_FULL.md).
//! Each completes (or errors) on the first `request`, needing no drain
//! loop since they emit at most one signal before terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::signal::{Publisher, Subscriber};
use crate::subscription::{Subscription, validate};
use crate::StreamError;

struct ImmediateSubscription<F> {
    fired: AtomicBool,
    action: F,
}

impl<F: Fn() + Send + Sync> Subscription for ImmediateSubscription<F> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        if !self.fired.swap(true, Ordering::AcqRel) {
            (self.action)();
        }
    }

    fn cancel(&self) {
        self.fired.store(true, Ordering::Release);
    }
}

/// A publisher that completes immediately without emitting any value.
pub struct Empty<T>(std::marker::PhantomData<fn() -> T>);

impl<T: Send + 'static> Empty<T> {
    /// Creates an empty publisher.
    pub fn new() -> Arc<Self> {
        Arc::new(Self(std::marker::PhantomData))
    }
}

impl<T: Send + 'static> Publisher<T> for Empty<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let downstream = subscriber.clone();
        let sub = Arc::new(ImmediateSubscription {
            fired: AtomicBool::new(false),
            action: move || downstream.on_complete(),
        });
        subscriber.on_subscribe(sub);
    }
}

/// A publisher that emits a single value then completes.
pub struct Once<T> {
    value: std::sync::Mutex<Option<T>>,
}

impl<T: Send + 'static> Once<T> {
    /// Creates a publisher emitting `value` once.
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            value: std::sync::Mutex::new(Some(value)),
        })
    }
}

impl<T: Send + 'static> Publisher<T> for Once<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let downstream = subscriber.clone();
        let value = self.value.lock().unwrap_or_else(|e| e.into_inner()).take();
        let value = std::sync::Mutex::new(value);
        let sub = Arc::new(ImmediateSubscription {
            fired: AtomicBool::new(false),
            action: move || {
                if let Some(v) = value.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    downstream.on_next(v);
                }
                downstream.on_complete();
            },
        });
        subscriber.on_subscribe(sub);
    }
}

/// A publisher that signals `on_error(error)` immediately on subscribe.
pub struct ErrorSource {
    error: std::sync::Mutex<Option<StreamError>>,
}

impl ErrorSource {
    /// Creates a publisher that errors immediately with `error`.
    pub fn new(error: StreamError) -> Arc<Self> {
        Arc::new(Self {
            error: std::sync::Mutex::new(Some(error)),
        })
    }
}

impl<T: Send + 'static> Publisher<T> for ErrorSource {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let downstream = subscriber.clone();
        let error = self
            .error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(|| StreamError::ProtocolViolation("ErrorSource fired twice".into()));
        let error = std::sync::Mutex::new(Some(error));
        let sub = Arc::new(ImmediateSubscription {
            fired: AtomicBool::new(false),
            action: move || {
                if let Some(e) = error.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    downstream.on_error(e);
                }
            },
        });
        subscriber.on_subscribe(sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::TestSubscriber;

    #[test]
    fn empty_completes_with_no_values() {
        let values = crate::subscriber::collect(Empty::<i32>::new());
        assert!(values.is_empty());
    }

    #[test]
    fn once_emits_single_value() {
        let values = crate::subscriber::collect(Once::new(42));
        assert_eq!(values, vec![42]);
    }

    #[test]
    fn error_source_signals_error() {
        let sub = TestSubscriber::<i32>::new(crate::backpressure::UNBOUNDED);
        Publisher::subscribe(
            ErrorSource::new(StreamError::ProtocolViolation("boom".into())),
            sub.clone(),
        );
        sub.wait_for_terminal();
        assert!(sub.error().is_some());
    }
}
