//! Subscription handle and the two validation gatekeepers (§4.1).

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use std::sync::Arc;

use crate::error::{DroppedSignal, report_dropped};

/// A subscription handle: the downstream's means of signaling demand and
/// tearing down the upstream connection (§3 "Subscription handle").
pub trait Subscription: Send + Sync {
    /// Requests `n` further items. `n` must be `> 0`; callers should run
    /// values through [`validate`] first.
    fn request(&self, n: u64);

    /// Cancels the subscription. Idempotent (§5 "Cancellation").
    fn cancel(&self);
}

/// §4.1 `validate(n)`: returns `true` iff `n > 0`; otherwise reports a
/// protocol violation to the process-wide sink and returns `false`.
pub fn validate(n: u64) -> bool {
    if n == 0 {
        report_dropped(DroppedSignal::ProtocolViolation(
            "request(n) called with n == 0".to_string(),
        ));
        false
    } else {
        true
    }
}

/// A once-settable slot for the upstream [`Subscription`] an operator
/// receives via `on_subscribe`.
///
/// §4.1 `validate(current, incoming)`: if a subscription is already
/// installed, `incoming` is cancelled and a double-subscribe violation is
/// reported; otherwise `incoming` is installed and the caller may proceed.
#[derive(Default)]
pub struct UpstreamSlot {
    inner: Mutex<Option<Arc<dyn Subscription>>>,
    cancelled: AtomicBool,
}

impl UpstreamSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Attempts to install `incoming` as the upstream subscription. Returns
    /// `true` on success. If a subscription was already installed (a
    /// double-subscribe), `incoming` is cancelled, a protocol violation is
    /// reported, and `false` is returned.
    ///
    /// If this slot was already marked cancelled (the downstream cancelled
    /// before upstream's `on_subscribe` arrived), `incoming` is cancelled
    /// immediately and `false` is returned without reporting an error —
    /// that is a normal race, not a protocol violation.
    pub fn set(&self, incoming: Arc<dyn Subscription>) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            incoming.cancel();
            return false;
        }
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            drop(guard);
            incoming.cancel();
            report_dropped(DroppedSignal::ProtocolViolation(
                "double on_subscribe on the same operator subscriber".to_string(),
            ));
            false
        } else {
            *guard = Some(incoming);
            true
        }
    }

    /// Forwards `request(n)` to the installed subscription, if any.
    pub fn request(&self, n: u64) {
        if let Some(sub) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            sub.request(n);
        }
    }

    /// Cancels the installed subscription exactly once, and marks this
    /// slot so any subscription installed afterward is cancelled on
    /// arrival (§5 "Cancellation is idempotent").
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sub) = self.inner.lock().unwrap_or_else(|e| e.into_inner()).take() {
            sub.cancel();
        }
    }

    /// Whether `cancel()` has been observed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Subscription for UpstreamSlot {
    fn request(&self, n: u64) {
        UpstreamSlot::request(self, n);
    }

    fn cancel(&self) {
        UpstreamSlot::cancel(self);
    }
}

/// A no-op subscription, used by sources/operators that never honor
/// cancellation-before-subscribe races and by tests.
pub struct NoopSubscription;

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}
    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct Recording {
        requested: AtomicU64,
        cancelled: AtomicBool,
    }

    impl Subscription for Recording {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
        }
        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn validate_rejects_non_positive() {
        assert!(validate(1));
        assert!(!validate(0));
    }

    #[test]
    fn double_subscribe_cancels_incoming() {
        let slot = UpstreamSlot::new();
        let first = Arc::new(Recording {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        assert!(slot.set(first.clone()));

        let second = Arc::new(Recording {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        assert!(!slot.set(second.clone()));
        assert!(second.cancelled.load(Ordering::SeqCst));
        assert!(!first.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_subscribe_cancels_on_arrival() {
        let slot = UpstreamSlot::new();
        slot.cancel();
        let sub = Arc::new(Recording {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        assert!(!slot.set(sub.clone()));
        assert!(sub.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_is_idempotent() {
        let slot = UpstreamSlot::new();
        let sub = Arc::new(Recording {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        slot.set(sub.clone());
        slot.cancel();
        slot.cancel();
        assert!(sub.cancelled.load(Ordering::SeqCst));
    }
}
