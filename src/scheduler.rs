//! The executor abstraction (§6) and the install-cancel-handle CAS idiom
//! used by every scheduled-task integration (§9 "Cancellation races").

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::StreamError;

/// A handle that cancels a previously scheduled unit of work. `run()` is
/// idempotent.
pub trait CancelHandle: Send + Sync {
    /// Cancels the scheduled task. Safe to call more than once.
    fn run(&self);
}

/// A scheduler accepts units of work and executes them, possibly on
/// another thread. The library spawns no threads of its own; every
/// async-boundary operator is handed one of these by its caller.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` for execution. Returns a cancel handle, or
    /// `Err` if the scheduler refuses work (the caller must then error
    /// its stream with [`StreamError::SchedulerRejected`]).
    fn schedule(
        &self,
        task: Box<dyn FnOnce() + Send>,
    ) -> Result<Arc<dyn CancelHandle>, StreamError>;
}

/// A scheduler that can additionally delay a task (§4.11 `timer`/`interval`).
pub trait TimeScheduler: Scheduler {
    /// Schedules `task` to run after `delay`.
    fn schedule_after(
        &self,
        task: Box<dyn FnOnce() + Send>,
        delay: Duration,
    ) -> Arc<dyn CancelHandle>;
}

/// Three-state install-cancel-handle CAS slot (§9): a scheduled task may
/// race its own cancellation. The slot distinguishes "nothing installed
/// yet", "a handle is installed", and "cancelled before (or racing) the
/// handle's arrival", guaranteeing the underlying cancel handle's `run()`
/// executes at most once.
pub struct CancelSlot {
    state: AtomicU8,
    handle: Mutex<Option<Arc<dyn CancelHandle>>>,
}

const EMPTY: u8 = 0;
const INSTALLED: u8 = 1;
const CANCELLED: u8 = 2;

impl Default for CancelSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            handle: Mutex::new(None),
        }
    }

    /// Installs `handle`. If the slot was already cancelled, `handle.run()`
    /// is invoked immediately instead of being stored.
    pub fn install(&self, handle: Arc<dyn CancelHandle>) {
        match self
            .state
            .compare_exchange(EMPTY, INSTALLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
            }
            Err(CANCELLED) => handle.run(),
            Err(_) => unreachable!("install() called twice"),
        }
    }

    /// Cancels the slot. If a handle is already installed, runs it. If not,
    /// marks the slot so the handle runs immediately once installed.
    pub fn cancel(&self) {
        let prev = self.state.swap(CANCELLED, Ordering::AcqRel);
        if prev == INSTALLED {
            if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
                handle.run();
            }
        }
    }

    /// Whether `cancel()` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }
}

#[cfg(feature = "async")]
pub use tokio_adapter::TokioScheduler;

#[cfg(feature = "async")]
mod tokio_adapter {
    use super::*;
    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;

    struct TokioCancelHandle {
        join: Mutex<Option<JoinHandle<()>>>,
    }

    impl CancelHandle for TokioCancelHandle {
        fn run(&self) {
            if let Some(join) = self.join.lock().unwrap_or_else(|e| e.into_inner()).take() {
                join.abort();
            }
        }
    }

    /// A minimal [`Scheduler`]/[`TimeScheduler`] adapter over a Tokio
    /// runtime handle (§13 of SPEC_FULL.md: "one concrete adapter is
    /// supplied so `observe_on`/`timer` are runnable outside of tests").
    /// The core drain/queue machinery never depends on this: any executor
    /// can supply a [`Scheduler`] impl.
    #[derive(Clone)]
    pub struct TokioScheduler {
        handle: Handle,
    }

    impl TokioScheduler {
        /// Builds an adapter over `handle`.
        pub fn new(handle: Handle) -> Self {
            Self { handle }
        }

        /// Builds an adapter over the handle of the currently running
        /// Tokio runtime.
        pub fn current() -> Self {
            Self {
                handle: Handle::current(),
            }
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(
            &self,
            task: Box<dyn FnOnce() + Send>,
        ) -> Result<Arc<dyn CancelHandle>, StreamError> {
            let join = self.handle.spawn_blocking(task);
            Ok(Arc::new(TokioCancelHandle {
                join: Mutex::new(Some(join)),
            }))
        }
    }

    impl TimeScheduler for TokioScheduler {
        fn schedule_after(
            &self,
            task: Box<dyn FnOnce() + Send>,
            delay: std::time::Duration,
        ) -> Arc<dyn CancelHandle> {
            let join = self.handle.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
            Arc::new(TokioCancelHandle {
                join: Mutex::new(Some(join)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Flag(Arc<AtomicBool>);
    impl CancelHandle for Flag {
        fn run(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn install_then_cancel_runs_handle_once() {
        let slot = CancelSlot::new();
        let ran = Arc::new(AtomicBool::new(false));
        slot.install(Arc::new(Flag(ran.clone())));
        slot.cancel();
        assert!(ran.load(Ordering::SeqCst));
        slot.cancel();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_install_runs_handle_on_arrival() {
        let slot = CancelSlot::new();
        slot.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        slot.install(Arc::new(Flag(ran.clone())));
        assert!(ran.load(Ordering::SeqCst));
    }
}
