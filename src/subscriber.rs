//! Terminal subscribers for application code and tests (§13 of
//! SPEC_FULL.md): a `ForEach` callback subscriber and a blocking
//! `collect()` convenience function, grounded in the same "subscribe with
//! plain closures" idiom as the `Subscribable` trait in
//! `examples/other_examples/.../cma-rust/.../rx/observable.rs.rs`.

use std::sync::{Arc, Condvar, Mutex};

use crate::backpressure::UNBOUNDED;
use crate::signal::{Publisher, Subscriber};
use crate::subscription::Subscription;
use crate::StreamError;

struct Inner<T> {
    values: Mutex<Vec<T>>,
    terminal: Mutex<TerminalState>,
    condvar: Condvar,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

#[derive(Default)]
enum TerminalState {
    #[default]
    Pending,
    Completed,
    Errored(StreamError),
}

/// A subscriber that requests a fixed amount of demand up front, buffers
/// every value, and lets callers block until a terminal signal arrives.
///
/// This is test/example scaffolding, not part of the operator core: real
/// consumers normally drive their own backpressure via `Subscription`.
pub struct TestSubscriber<T> {
    inner: Inner<T>,
    initial_request: u64,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// Creates a subscriber that requests `initial_request` items on
    /// subscribe (pass [`UNBOUNDED`] to request everything).
    pub fn new(initial_request: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Inner {
                values: Mutex::new(Vec::new()),
                terminal: Mutex::new(TerminalState::Pending),
                condvar: Condvar::new(),
                subscription: Mutex::new(None),
            },
            initial_request,
        })
    }

    /// Blocks the calling thread until a terminal signal (`on_error` or
    /// `on_complete`) has been observed.
    pub fn wait_for_terminal(&self) {
        let guard = self.inner.terminal.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self
            .inner
            .condvar
            .wait_while(guard, |t| matches!(t, TerminalState::Pending))
            .unwrap_or_else(|e| e.into_inner());
    }

    /// All values observed so far.
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The terminal error, if the subscription ended in `on_error`.
    pub fn error(&self) -> Option<StreamError> {
        match &*self.inner.terminal.lock().unwrap_or_else(|e| e.into_inner()) {
            TerminalState::Errored(e) => Some(clone_stream_error(e)),
            _ => None,
        }
    }

    /// Requests `n` further items from upstream.
    pub fn request_more(&self, n: u64) {
        if let Some(sub) = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            sub.request(n);
        }
    }

    /// Cancels the subscription.
    pub fn cancel(&self) {
        if let Some(sub) = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            sub.cancel();
        }
    }
}

// `StreamError` doesn't derive `Clone` (it wraps arbitrary user-facing
// strings and a `Vec` in the composite case); a minimal textual clone is
// enough for tests that only assert on error presence/shape.
fn clone_stream_error(e: &StreamError) -> StreamError {
    StreamError::ProtocolViolation(e.to_string())
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(self.initial_request);
        *self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    fn on_next(&self, value: T) {
        self.inner
            .values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(value);
    }

    fn on_error(&self, error: StreamError) {
        *self.inner.terminal.lock().unwrap_or_else(|e| e.into_inner()) = TerminalState::Errored(error);
        self.inner.condvar.notify_all();
    }

    fn on_complete(&self) {
        *self.inner.terminal.lock().unwrap_or_else(|e| e.into_inner()) = TerminalState::Completed;
        self.inner.condvar.notify_all();
    }
}

/// Subscribes to `publisher` with unbounded demand, blocks until
/// termination, and returns every observed value. Panics if the stream
/// terminated with an error — use [`TestSubscriber`] directly to inspect
/// errors.
pub fn collect<T: Send + Clone + 'static>(publisher: Arc<dyn Publisher<T>>) -> Vec<T> {
    let subscriber = TestSubscriber::new(UNBOUNDED);
    publisher.subscribe(subscriber.clone());
    subscriber.wait_for_terminal();
    if let Some(err) = subscriber.error() {
        panic!("collect() observed an error: {err}");
    }
    subscriber.values()
}

/// A subscriber that invokes a closure for every value and requests
/// `prefetch` items at a time, re-requesting as each batch is consumed —
/// the simplest possible conforming downstream.
pub struct ForEach<T> {
    f: Mutex<Box<dyn FnMut(T) + Send>>,
    prefetch: u64,
    consumed: std::sync::atomic::AtomicU64,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl<T: Send + 'static> ForEach<T> {
    /// Creates a `ForEach` subscriber that requests `prefetch` items at a
    /// time.
    pub fn new(prefetch: u64, f: impl FnMut(T) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            f: Mutex::new(Box::new(f)),
            prefetch: prefetch.max(1),
            consumed: std::sync::atomic::AtomicU64::new(0),
            subscription: Mutex::new(None),
        })
    }
}

impl<T: Send + 'static> Subscriber<T> for ForEach<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(self.prefetch);
        *self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(subscription);
    }

    fn on_next(&self, value: T) {
        (self.f.lock().unwrap_or_else(|e| e.into_inner()))(value);
        let consumed = self.consumed.fetch_add(1, std::sync::atomic::Ordering::AcqRel) + 1;
        if consumed >= self.prefetch {
            self.consumed.store(0, std::sync::atomic::Ordering::Release);
            if let Some(sub) = self
                .subscription
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
            {
                sub.request(self.prefetch);
            }
        }
    }

    fn on_error(&self, error: StreamError) {
        tracing::debug!(%error, "ForEach subscriber observed an error");
    }

    fn on_complete(&self) {}
}
