//! Bisection over nightly builds.
//!
//! Binds the user's date bounds and target preferences to the ordered build
//! list, drives the async binary search with a probe that runs one build,
//! and turns the insertion point into the last good / first bad pair.

mod bisector;
mod types;

pub use bisector::{
    classify_status, filter_by_date, parse_bound_date, select_targets, validate_bounds, Bisector,
};
pub use types::{
    BisectError, BisectOutcome, BisectRequest, BisectionCandidate, RangeCallback, ResultCallback,
    TestedBuild,
};
