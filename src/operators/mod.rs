//! Operator implementations (§4 of `spec.md`, crate layout in §10 of
//! SPEC_FULL.md): the five concurrency cores plus the stateless conforming
//! instances named in §1's Non-goals.

mod buffer;
mod concat;
mod distinct_until_changed;
mod element_at;
mod filter;
mod flat_map;
mod map;
mod merge;
mod observe_on;
mod reduce;
mod scan;
mod skip;
mod take;
mod take_while;
mod timer;
mod zip;

pub use buffer::{Buffer, BufferConfig};
pub use concat::Concat;
pub use distinct_until_changed::DistinctUntilChanged;
pub use element_at::ElementAt;
pub use filter::Filter;
pub use flat_map::{FlatMap, FlatMapConfig};
pub use map::Map;
pub use merge::Merge;
pub use observe_on::{ObserveOn, ObserveOnConfig};
pub use reduce::Reduce;
pub use scan::Scan;
pub use skip::Skip;
pub use take::Take;
pub use take_while::TakeWhile;
pub use timer::{Interval, IntervalConfig, Timer, TimerConfig};
pub use zip::{Zip, ZipConfig};
