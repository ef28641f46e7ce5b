//! Build & test execution against upstream commits.

pub mod maven;
pub mod process;

use anyhow::Result;

use crate::models::Failure;

/// Build/test primitives consumed by the bisection engine.
///
/// `Ok(false)` means the build broke or the test failed — an expected,
/// handled signal. `Err` means the command could not be run at all and the
/// run should abort.
pub trait TestRunner {
    /// Check out `commit` and build the upstream dependency.
    fn build(&mut self, commit: &str) -> Result<bool>;

    /// Run the failing test against the most recently built commit.
    fn run_test(&mut self, failure: &Failure) -> Result<bool>;
}

pub use maven::MavenRunner;
pub use process::{CapturedCommand, CommandError};
