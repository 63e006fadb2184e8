//! Saturating backpressure arithmetic and the outstanding-demand cell (§4.2).

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel denoting "unbounded demand". Chosen as the largest value a
/// non-negative `i64`-shaped counter can hold, matching `Long.MAX_VALUE` in
/// the prior art this spec distills: `request(UNBOUNDED)` disables the
/// per-emission decrement entirely.
pub const UNBOUNDED: u64 = i64::MAX as u64;

/// Saturating add, clamped at [`UNBOUNDED`] (§4.2 `add-cap`).
#[inline]
#[must_use]
pub fn add_cap(a: u64, b: u64) -> u64 {
    match a.checked_add(b) {
        Some(sum) if sum <= UNBOUNDED => sum,
        _ => UNBOUNDED,
    }
}

/// Saturating multiply, clamped at [`UNBOUNDED`] (§4.2 `multiply-cap`).
#[inline]
#[must_use]
pub fn multiply_cap(a: u64, b: u64) -> u64 {
    match a.checked_mul(b) {
        Some(product) if product <= UNBOUNDED => product,
        _ => UNBOUNDED,
    }
}

/// An atomic, saturating outstanding-demand counter.
///
/// All mutation goes through a CAS loop applying [`add_cap`]/subtraction, so
/// concurrent `request()` calls from multiple threads each contribute their
/// entire `n` exactly once (§3 "Outstanding demand").
#[derive(Debug, Default)]
pub struct Demand {
    value: AtomicU64,
}

impl Demand {
    /// Creates a demand cell starting at zero.
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Current outstanding demand (acquire load).
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Returns `true` if this cell is in the unbounded state.
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }

    /// Atomically adds `n`, saturating at [`UNBOUNDED`]. Returns the
    /// pre-image (§4.2 `atomic-add`).
    pub fn add(&self, n: u64) -> u64 {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = add_cap(current, n);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return prev,
                Err(observed) => current = observed,
            }
        }
    }

    /// Decrements by `n` unless the cell is unbounded, in which case it is
    /// left untouched (§3 "the emitter decrements by one except when the
    /// budget equals the unbounded sentinel"). Saturates at zero rather
    /// than underflowing, which can only happen under a protocol violation
    /// upstream (more emissions than requested).
    pub fn consume(&self, n: u64) {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if current == UNBOUNDED {
                return;
            }
            let next = current.saturating_sub(n);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Resets the cell to zero, returning the previous value. Used when an
    /// operator re-bases demand against a freshly (re)subscribed upstream.
    pub fn take(&self) -> u64 {
        self.value.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_cap_saturates() {
        assert_eq!(add_cap(1, 2), 3);
        assert_eq!(add_cap(UNBOUNDED, 1), UNBOUNDED);
        assert_eq!(add_cap(UNBOUNDED - 1, 5), UNBOUNDED);
    }

    #[test]
    fn add_cap_exact_when_no_overflow() {
        for (a, b) in [(0u64, 0u64), (10, 20), (UNBOUNDED - 1, 1)] {
            if a + b <= UNBOUNDED {
                assert_eq!(add_cap(a, b), a + b);
            }
        }
    }

    #[test]
    fn multiply_cap_saturates() {
        assert_eq!(multiply_cap(2, 3), 6);
        assert_eq!(multiply_cap(UNBOUNDED, 2), UNBOUNDED);
    }

    #[test]
    fn demand_add_and_consume() {
        let d = Demand::new();
        assert_eq!(d.add(5), 0);
        assert_eq!(d.get(), 5);
        d.consume(2);
        assert_eq!(d.get(), 3);
    }

    #[test]
    fn demand_unbounded_ignores_consume() {
        let d = Demand::new();
        d.add(UNBOUNDED);
        d.consume(1_000_000);
        assert_eq!(d.get(), UNBOUNDED);
    }

    #[test]
    fn demand_add_saturates_across_calls() {
        let d = Demand::new();
        d.add(UNBOUNDED - 1);
        d.add(10);
        assert_eq!(d.get(), UNBOUNDED);
    }
}
