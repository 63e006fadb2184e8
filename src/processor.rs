//! Multicast processor (§4.10): both a [`Subscriber`] (of one upstream) and
//! a [`Publisher`] (to many downstreams), fanning each upstream emission out
//! synchronously under a copy-on-write subscriber array.
//!
//! Two behaviors are deliberately preserved from the source, per the
//! explicit open questions in §9 of `spec.md`:
//! - the upstream handle this processor receives is never cancelled —
//!   callers who need to detach from upstream must wrap the processor;
//! - there is no "unbounded demand" fast path in the backpressure-miss
//!   check; a slow subscriber is removed and errored exactly the same way
//!   regardless of how large its outstanding demand looked a moment ago.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::StreamError;
use crate::backpressure::{Demand, UNBOUNDED};
use crate::signal::{Publisher, Subscriber};
use crate::subscription::{NoopSubscription, Subscription, validate};

enum ProcessorState<T> {
    Active(Vec<Arc<SubscriberRecord<T>>>),
    /// `None` = completed normally; `Some(message)` = errored, with a
    /// textual rendering of the cause replayed to late subscribers.
    Terminated(Option<String>),
}

struct SubscriberRecord<T> {
    id: u64,
    downstream: Arc<dyn Subscriber<T>>,
    demand: Demand,
}

/// A single-upstream, many-downstream relay. Subscribe to it as a
/// publisher; feed it as a subscriber to some upstream publisher.
pub struct Processor<T> {
    state: Mutex<ProcessorState<T>>,
    next_id: AtomicU64,
}

impl<T: Send + Clone + 'static> Processor<T> {
    /// Creates an unattached processor with no subscribers yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ProcessorState::Active(Vec::new())),
            next_id: AtomicU64::new(0),
        })
    }

    fn remove(&self, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let ProcessorState::Active(subs) = &mut *state {
            subs.retain(|r| r.id != id);
        }
    }

    fn terminate(&self, error: Option<StreamError>) {
        let subs = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let message = error.as_ref().map(|e| e.to_string());
            match std::mem::replace(&mut *state, ProcessorState::Terminated(message)) {
                ProcessorState::Active(subs) => subs,
                ProcessorState::Terminated(_) => return,
            }
        };
        match error {
            Some(err) => {
                for record in &subs {
                    record.downstream.on_error(render(&err));
                }
            }
            None => {
                for record in &subs {
                    record.downstream.on_complete();
                }
            }
        }
    }
}

/// A textual re-rendering, used only to replay a terminal error to more
/// than one subscriber (`StreamError` is not `Clone`).
fn render(error: &StreamError) -> StreamError {
    StreamError::ProtocolViolation(error.to_string())
}

impl<T: Send + Clone + 'static> Publisher<T> for Processor<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *state {
            ProcessorState::Active(subs) => {
                let id = self.next_id.fetch_add(1, Ordering::AcqRel);
                let record = Arc::new(SubscriberRecord {
                    id,
                    downstream: subscriber.clone(),
                    demand: Demand::new(),
                });
                let mut next = subs.clone();
                next.push(record);
                *subs = next;
                drop(state);
                subscriber.on_subscribe(Arc::new(ProcessorSubscription {
                    processor: self.clone(),
                    id,
                }));
            }
            ProcessorState::Terminated(message) => {
                let message = message.clone();
                drop(state);
                subscriber.on_subscribe(Arc::new(NoopSubscription));
                match message {
                    None => subscriber.on_complete(),
                    Some(m) => subscriber.on_error(StreamError::ProtocolViolation(m)),
                }
            }
        }
    }
}

impl<T: Send + Clone + 'static> Subscriber<T> for Processor<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        // §9 open question: this handle is intentionally never cancelled.
        subscription.request(UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        let subs = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &*state {
                ProcessorState::Active(subs) => subs.clone(),
                ProcessorState::Terminated(_) => return,
            }
        };
        let mut starved = Vec::new();
        for record in &subs {
            if record.demand.get() > 0 {
                record.demand.consume(1);
                record.downstream.on_next(value.clone());
            } else {
                starved.push(record.id);
            }
        }
        for id in starved {
            self.remove(id);
            if let Some(record) = subs.iter().find(|r| r.id == id) {
                record.downstream.on_error(StreamError::ProtocolViolation(
                    "downstream had no outstanding demand".to_string(),
                ));
            }
        }
    }

    fn on_error(&self, error: StreamError) {
        self.terminate(Some(error));
    }

    fn on_complete(&self) {
        self.terminate(None);
    }
}

struct ProcessorSubscription<T> {
    processor: Arc<Processor<T>>,
    id: u64,
}

impl<T: Send + Clone + 'static> Subscription for ProcessorSubscription<T> {
    fn request(&self, n: u64) {
        if !validate(n) {
            return;
        }
        let state = self.processor.state.lock().unwrap_or_else(|e| e.into_inner());
        if let ProcessorState::Active(subs) = &*state {
            if let Some(record) = subs.iter().find(|r| r.id == self.id) {
                record.demand.add(n);
            }
        }
    }

    fn cancel(&self) {
        self.processor.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::TestSubscriber;

    #[test]
    fn slow_subscriber_is_removed_and_errored_while_fast_one_completes() {
        // §8 scenario 6.
        let processor = Processor::<i64>::new();

        let slow = TestSubscriber::<i64>::new(2);
        Publisher::subscribe(processor.clone(), slow.clone());
        let fast = TestSubscriber::<i64>::new(UNBOUNDED);
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

    #[test]
    fn late_subscriber_after_complete_replays_terminal_immediately() {
        let processor = Processor::<i64>::new();
        processor.on_complete();

        let late = TestSubscriber::<i64>::new(UNBOUNDED);
        Publisher::subscribe(processor, late.clone());
        late.wait_for_terminal();
        assert!(late.error().is_none());
        assert!(late.values().is_empty());
    }
}
