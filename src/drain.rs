//! The `wip`-drain serialization idiom (§4.3).
//!
//! This is the single-consumer election primitive used by every operator
//! that may be entered concurrently (upstream emission, downstream
//! `request`, cancellation) but must serially observe its own
//! downstream-emission section. The pattern: a 32-bit counter incremented
//! by every contributor; a zero-to-one transition elects the caller as the
//! drain-owner, who loops draining until its own decrements bring the
//! counter back to zero.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

/// A work-conserving single-consumer drain election counter.
///
/// Cache-padded like the teacher's channel cursors: `wip` is written by
/// every producer thread that wants to trigger a drain, so it sits on its
/// own cache line to avoid false sharing with operator-specific state.
#[derive(Debug, Default)]
pub struct Wip {
    counter: CachePadded<AtomicU32>,
}

impl Wip {
    /// Creates a new, idle drain counter.
    pub const fn new() -> Self {
        Self {
            counter: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Registers one unit of outstanding work. Returns `true` if the
    /// caller observed the zero-to-one transition and must now become the
    /// drain-owner and run the loop; returns `false` if another thread is
    /// already draining (it will observe this contribution before exiting).
    #[inline]
    pub fn enter(&self) -> bool {
        self.counter.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Called by the drain-owner after completing one full pass of its
    /// loop. `missed` is the value previously returned by `enter`/`leave`
    /// (1 for the very first pass). Returns the counter's value after
    /// subtracting `missed`: zero means no contributor re-entered while
    /// this pass ran, so the owner should exit; a nonzero value means
    /// fresh work arrived mid-pass and must feed the next `leave` call.
    #[inline]
    pub fn leave(&self, missed: u32) -> u32 {
        self.counter.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// Current snapshot, for diagnostics/tests only — never used to decide
    /// drain ownership (that's `enter`/`leave`'s job).
    #[cfg(test)]
    pub(crate) fn get(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn single_entry_elects_owner() {
        let wip = Wip::new();
        assert!(wip.enter());
        assert_eq!(wip.get(), 1);
        assert_eq!(wip.leave(1), 0);
        assert_eq!(wip.get(), 0);
    }

    #[test]
    fn re_entry_during_drain_keeps_owner_looping() {
        let wip = Wip::new();
        assert!(wip.enter()); // owner elected
        assert!(!wip.enter()); // concurrent contributor, not owner
        // Owner drains one pass, but must loop again since wip != 0 after leave.
        assert_eq!(wip.leave(1), 1);
        assert_eq!(wip.leave(1), 0);
    }

    /// Only one thread should ever believe itself the drain owner at a time.
    #[test]
    fn exactly_one_owner_under_contention() {
        let wip = Arc::new(Wip::new());
        let owners = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let wip = wip.clone();
            let owners = owners.clone();
            handles.push(thread::spawn(move || {
                if wip.enter() {
                    owners.fetch_add(1, Ordering::SeqCst);
                    // Drain until the counter returns to zero.
                    let mut missed = 1;
                    loop {
                        missed = wip.leave(missed);
                        if missed == 0 {
                            break;
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(owners.load(Ordering::SeqCst), 1);
    }
}
