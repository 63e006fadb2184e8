//! The four-signal subscriber contract and the publisher entry point (§6).

use std::sync::Arc;

use crate::StreamError;
use crate::subscription::Subscription;

/// A downstream observer. Implementations must serially observe their own
/// four signals (§3 "Invariants (global)") — operators guarantee this for
/// their downstream by funneling everything through a single
/// [`crate::drain::Wip`]-guarded section; terminal leaf subscribers
/// (application code) get it for free because they are only ever invoked
/// from within that section.
pub trait Subscriber<T>: Send + Sync {
    /// Delivered exactly once, before any other signal.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Delivered zero or more times, each decrementing outstanding demand
    /// by one (unless demand is unbounded).
    fn on_next(&self, value: T);

    /// Terminal. No further signal follows.
    fn on_error(&self, error: StreamError);

    /// Terminal. No further signal follows.
    fn on_complete(&self);
}

/// A source of signals. The sole operation is `subscribe`; everything else
/// (configuration, composition) happens at construction time.
pub trait Publisher<T>: Send + Sync {
    /// Subscribes `subscriber` to this publisher. Must eventually call
    /// exactly one of `subscriber.on_subscribe` (generally synchronously,
    /// before returning) followed later by at most one terminal signal.
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>);
}
