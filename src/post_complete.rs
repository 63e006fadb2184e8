//! The demand-with-completion field used by buffering operators (§4.4).
//!
//! Operators like `buffer` may finish reading their upstream while items
//! they already produced are still sitting in a downstream-facing queue.
//! The top bit of a 64-bit field flags "source completed, keep replaying
//! from the buffer on future `request` calls"; the low 63 bits hold
//! outstanding demand. This lets a late `request(n)` after upstream
//! termination resume delivery without re-touching upstream.

use std::sync::atomic::{AtomicU64, Ordering};

const COMPLETED_BIT: u64 = 1 << 63;
const DEMAND_MASK: u64 = COMPLETED_BIT - 1;

/// The demand-with-completion field (§3 "Demand-with-completion field").
#[derive(Debug, Default)]
pub struct PostCompleteField {
    state: AtomicU64,
}

/// Outcome of [`PostCompleteField::request`].
pub enum RequestOutcome {
    /// The caller must drive the drain itself; `request()` should *not*
    /// forward to upstream (upstream is already done).
    DriveDrain,
    /// Upstream is not yet complete (or demand was already nonzero); the
    /// caller should forward `request(n)` to upstream as normal.
    ForwardUpstream,
}

impl PostCompleteField {
    /// A fresh field: not completed, zero demand.
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    fn split(raw: u64) -> (bool, u64) {
        (raw & COMPLETED_BIT != 0, raw & DEMAND_MASK)
    }

    /// §4.4 `post-complete-request(n)`: atomically adds `n` to the low 63
    /// bits. If the pre-image was `{completed, 0}`, returns
    /// [`RequestOutcome::DriveDrain`] so the caller drains inline instead of
    /// forwarding the request upstream (there is no upstream left to ask).
    pub fn request(&self, n: u64) -> RequestOutcome {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (completed, demand) = Self::split(current);
            let next_demand = demand.saturating_add(n).min(DEMAND_MASK);
            let next = if completed {
                next_demand | COMPLETED_BIT
            } else {
                next_demand
            };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return if completed && demand == 0 {
                        RequestOutcome::DriveDrain
                    } else {
                        RequestOutcome::ForwardUpstream
                    };
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// §4.4 `post-complete(n)`: called once, on upstream completion, with
    /// the number of buffered items still undelivered (`n`). Returns
    /// `true` if the caller should drive a drain immediately (there was
    /// already nonzero demand waiting), `false` if the completion bit was
    /// merely set for a future `request` to pick up.
    ///
    /// If `queue_empty` is `true` the caller should instead signal
    /// `on_complete` directly and skip this call entirely (§4.4).
    pub fn complete(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (_, demand) = Self::split(current);
            let next = demand | COMPLETED_BIT;
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return demand != 0,
                Err(observed) => current = observed,
            }
        }
    }

    /// Current outstanding demand, ignoring the completion bit.
    pub fn demand(&self) -> u64 {
        Self::split(self.state.load(Ordering::Acquire)).1
    }

    /// Whether the completion bit is set.
    pub fn is_completed(&self) -> bool {
        Self::split(self.state.load(Ordering::Acquire)).0
    }

    /// §4.4 `post-complete-drain(n)`: subtracts `emitted` from the low
    /// bits after a batch has been delivered. Returns the new demand.
    pub fn subtract(&self, emitted: u64) -> u64 {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let (completed, demand) = Self::split(current);
            let next_demand = demand.saturating_sub(emitted);
            let next = if completed {
                next_demand | COMPLETED_BIT
            } else {
                next_demand
            };
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next_demand,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_before_completion_forwards_upstream() {
        let f = PostCompleteField::new();
        assert!(matches!(f.request(3), RequestOutcome::ForwardUpstream));
        assert_eq!(f.demand(), 3);
    }

    #[test]
    fn request_after_completion_with_zero_demand_drives_drain() {
        let f = PostCompleteField::new();
        assert!(!f.complete()); // no demand yet, just sets the bit
        assert!(matches!(f.request(2), RequestOutcome::DriveDrain));
        assert_eq!(f.demand(), 2);
        assert!(f.is_completed());
    }

    #[test]
    fn complete_with_existing_demand_signals_immediate_drain() {
        let f = PostCompleteField::new();
        f.request(5);
        assert!(f.complete());
    }

    #[test]
    fn subtract_tracks_remaining_demand() {
        let f = PostCompleteField::new();
        f.request(5);
        assert_eq!(f.subtract(2), 3);
        assert_eq!(f.subtract(10), 0);
    }
}
