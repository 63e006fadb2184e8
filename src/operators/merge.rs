//! `merge` (§4.9): fans in a fixed set of sources concurrently, reusing the
//! drain/inner-queue/error machinery built for `flat_map` (§4.6) — the only
//! difference is that the source registry is known up front instead of
//! growing lazily from an outer publisher's emissions.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::signal::{Publisher, Subscriber};
use crate::subscription::Subscription;

use super::flat_map::{FanInState, FanInSubscription, FlatMapConfig};

/// Concurrently subscribes to every publisher in `sources` and interleaves
/// their emissions, applying backpressure the same way `flat_map` does.
pub struct Merge<T> {
    sources: Vec<Arc<dyn Publisher<T>>>,
    config: FlatMapConfig,
}

impl<T: Send + 'static> Merge<T> {
    /// Merges `sources`. `config.max_concurrency` is clamped up to
    /// `sources.len()` since every source is active from the start.
    pub fn new(sources: Vec<Arc<dyn Publisher<T>>>, mut config: FlatMapConfig) -> Arc<Self> {
        config.max_concurrency = config.max_concurrency.max(sources.len());
        Arc::new(Self { sources, config })
    }
}

impl<T: Send + 'static> Publisher<T> for Merge<T> {
    fn subscribe(self: Arc<Self>, subscriber: Arc<dyn Subscriber<T>>) {
        let state = Arc::new(FanInState::new(subscriber, self.config));
        state.downstream.on_subscribe(Arc::new(FanInSubscription::new(state.clone())));
        // There is no outer publisher: mark it done up front so the
        // terminal check only waits on the fixed set of inners below.
        state.outer_done.store(true, Ordering::Release);
        if self.sources.is_empty() {
            state.enter_and_drain();
            return;
        }
        for source in &self.sources {
            state.offer_inner(source.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Range;
    use crate::subscriber::collect;

    #[test]
    fn merges_all_sources_to_completion() {
        let mut values = collect(Merge::new(
            vec![Range::new(1, 3), Range::new(10, 3)],
            FlatMapConfig::default(),
        ));
        values.sort_unstable();
        assert_eq!(values, vec![1, 2, 3, 10, 11, 12]);
    }

    #[test]
    fn merging_no_sources_completes_immediately() {
        let values: Vec<i64> = collect(Merge::new(vec![], FlatMapConfig::default()));
        assert!(values.is_empty());
    }
}
