//! Universal properties (§8 of `spec.md`), checked against the public API
//! with randomly generated inputs via `proptest`. These are black-box
//! integration properties — unlike the inline `#[cfg(test)]` unit tests next
//! to each operator, which reach into operator-internal scaffolding (local
//! scheduler doubles, `FanInState` internals, and so on), everything here
//! goes through `rxcore`'s public surface only.

use proptest::prelude::*;

use rxcore::backpressure::{UNBOUNDED, add_cap, multiply_cap};
use rxcore::operators::{Concat, DistinctUntilChanged, Filter, Map};
use rxcore::source::FromIter;
use rxcore::subscriber::collect;

proptest! {
    /// §8 "Saturating arithmetic": `add-cap(a, b) <= max_positive`, and is
    /// exact whenever the true sum doesn't overflow it.
    #[test]
    fn add_cap_never_exceeds_unbounded_and_is_exact_below_it(a in 0u64..=UNBOUNDED, b in 0u64..=UNBOUNDED) {
        let sum = add_cap(a, b);
        prop_assert!(sum <= UNBOUNDED);
        if let Some(exact) = a.checked_add(b) {
            if exact <= UNBOUNDED {
                prop_assert_eq!(sum, exact);
            }
        }
    }

    /// Same saturation property for `multiply-cap`.
    #[test]
    fn multiply_cap_never_exceeds_unbounded_and_is_exact_below_it(a in 0u64..=UNBOUNDED, b in 0u64..=UNBOUNDED) {
        let product = multiply_cap(a, b);
        prop_assert!(product <= UNBOUNDED);
        if let Some(exact) = a.checked_mul(b) {
            if exact <= UNBOUNDED {
                prop_assert_eq!(product, exact);
            }
        }
    }

    /// §8 round-trip: `map(id)` is the identity on traces.
    #[test]
    fn map_identity_is_identity_on_traces(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let out = collect(Map::new(FromIter::new(values.clone()), Ok));
        prop_assert_eq!(out, values);
    }

    /// §8 round-trip: `filter(true)` is the identity.
    #[test]
    fn filter_always_true_is_identity(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let out = collect(Filter::new(FromIter::new(values.clone()), |_| true));
        prop_assert_eq!(out, values);
    }

    /// §8 round-trip: `concat([p])` is equivalent to `p`.
    #[test]
    fn concat_of_a_single_source_is_identity(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let out = collect(Concat::new(vec![FromIter::new(values.clone())], false));
        prop_assert_eq!(out, values);
    }

    /// `distinct-until-changed` never emits two equal values back to back,
    /// and never drops the first occurrence of a run.
    #[test]
    fn distinct_until_changed_collapses_only_consecutive_duplicates(values in prop::collection::vec(0i64..5, 0..64)) {
        let out = collect(DistinctUntilChanged::new(FromIter::new(values.clone())));
        let mut expected: Vec<i64> = Vec::new();
        for v in values {
            if expected.last() != Some(&v) {
                expected.push(v);
            }
        }
        prop_assert_eq!(out, expected);
    }
}
