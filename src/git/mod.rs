//! Git access: command runner and the commit range provider.

pub mod range;
pub mod runner;

pub use range::{CommitRangeProvider, CommitReader, GitCommitRange};
