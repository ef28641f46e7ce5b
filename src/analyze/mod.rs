//! Failure analysis: grouping, upstream change resolution, bisection.

pub mod bisect;
pub mod grouping;
pub mod resolver;

use anyhow::Result;

use crate::models::{Failure, UpstreamChange};

/// Resolves the upstream change behind a failure, invoked once per newly
/// created root cause.
pub trait UpstreamChangeFinder {
    /// None means "nothing to report" (an existing failure with no stored
    /// attribution); an unresolvable bisection still returns a value
    /// carrying its reason.
    fn find_upstream_change(&mut self, failure: &Failure) -> Result<Option<UpstreamChange>>;
}

pub use bisect::{BisectOutcome, Bisector};
pub use grouping::FailureAnalyzer;
pub use resolver::{ResolverOptions, UpstreamChangeResolver};
