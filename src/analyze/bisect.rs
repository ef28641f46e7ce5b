//! Bisection engine.
//!
//! Finds the first commit in a newest→oldest range at which a test fails,
//! tolerating broken builds and non-reproducible failures. Two search
//! strategies share the oldest-commit validation and the build/test
//! primitives; which one runs is a configuration choice.

use std::collections::HashMap;

use anyhow::Result;
use regex::Regex;

use crate::config::BisectStrategy;
use crate::git::range::CommitReader;
use crate::models::{Failure, FailureReason};
use crate::run::TestRunner;

/// Build failures tolerated during binary search before falling back to a
/// linear sweep of the whole range.
const MAX_BUILD_FAILURES: u32 = 3;

/// Result of one bisection. `commit` is present exactly when `reason` is
/// [`FailureReason::Found`]; `tested_commits` lists every commit actually
/// built, in build order.
#[derive(Debug, Clone, PartialEq)]
pub struct BisectOutcome {
    pub commit: Option<String>,
    pub pull_request: Option<String>,
    pub commit_message: Option<String>,
    pub tested_commits: Vec<String>,
    pub reason: FailureReason,
}

impl BisectOutcome {
    fn unresolved(reason: FailureReason, tested_commits: Vec<String>) -> Self {
        Self {
            commit: None,
            pull_request: None,
            commit_message: None,
            tested_commits,
            reason,
        }
    }
}

/// One bisection run over a fixed commit range.
///
/// Owns no cross-invocation state: the pass/fail cache lives and dies with
/// a single `bisect` call.
pub struct Bisector<'a, R: CommitReader + ?Sized> {
    runner: &'a mut dyn TestRunner,
    reader: &'a R,
    strategy: BisectStrategy,
}

impl<'a, R: CommitReader + ?Sized> Bisector<'a, R> {
    pub fn new(
        runner: &'a mut dyn TestRunner,
        reader: &'a R,
        strategy: BisectStrategy,
    ) -> Self {
        Self {
            runner,
            reader,
            strategy,
        }
    }

    /// Locate the commit that introduced `failure` within `commits`
    /// (ordered newest first).
    pub fn bisect(&mut self, failure: &Failure, commits: &[String]) -> Result<BisectOutcome> {
        match self.strategy {
            BisectStrategy::Binary => {
                tracing::info!(commits = commits.len(), "Bisecting with binary search");
                self.binary(failure, commits)
            }
            BisectStrategy::Linear => {
                tracing::info!(commits = commits.len(), "Bisecting with linear search");
                self.linear(failure, commits)
            }
        }
    }

    /// Walk from the oldest commit toward the newest and stop at the first
    /// failure. Unbuildable commits other than the oldest are skipped.
    fn linear(&mut self, failure: &Failure, commits: &[String]) -> Result<BisectOutcome> {
        let mut tested = Vec::new();

        if commits.is_empty() {
            tracing::info!("No commits to test");
            return Ok(BisectOutcome::unresolved(FailureReason::CannotReproduce, tested));
        }

        for index in (0..commits.len()).rev() {
            let commit = &commits[index];
            let is_oldest = index == commits.len() - 1;
            tracing::info!(
                step = commits.len() - index,
                total = commits.len(),
                %commit,
                "Testing commit"
            );

            tested.push(commit.clone());
            if !self.runner.build(commit)? {
                if is_oldest {
                    tracing::error!(%commit, "Oldest commit in range does not build, no baseline");
                    return Ok(BisectOutcome::unresolved(FailureReason::BuildFailed, tested));
                }
                tracing::info!(%commit, "Skipping unbuildable commit");
                continue;
            }

            if !self.runner.run_test(failure)? {
                if is_oldest {
                    tracing::error!(
                        %commit,
                        "Test already fails at the oldest commit in range, \
                         the regression predates the search window"
                    );
                    return Ok(BisectOutcome::unresolved(
                        FailureReason::OldestCommitFailed,
                        tested,
                    ));
                }
                return Ok(self.found(commit, tested));
            }
        }

        tracing::info!("Test passes on every commit in range, likely flaky");
        Ok(BisectOutcome::unresolved(FailureReason::CannotReproduce, tested))
    }

    /// Classic bisection over indices newest=0 … oldest=len-1, under the
    /// invariant "the oldest commit passes". Falls back to a linear sweep
    /// after [`MAX_BUILD_FAILURES`] broken builds.
    fn binary(&mut self, failure: &Failure, commits: &[String]) -> Result<BisectOutcome> {
        let mut tested = Vec::new();
        let mut build_failures = 0u32;

        if commits.is_empty() {
            tracing::info!("No commits to test");
            return Ok(BisectOutcome::unresolved(FailureReason::CannotReproduce, tested));
        }

        // Pass/fail results for this invocation only; build-failure
        // narrowing can revisit an index.
        let mut results: HashMap<String, bool> = HashMap::new();

        let mut low = (commits.len() - 1) as isize; // oldest
        let mut high = 0isize; // newest

        // Validate the oldest commit to establish a known-good baseline.
        let oldest = &commits[low as usize];
        tracing::info!(commit = %oldest, "Validating oldest commit in range");
        tested.push(oldest.clone());
        if !self.runner.build(oldest)? {
            tracing::error!(commit = %oldest, "Oldest commit in range does not build, no baseline");
            return Ok(BisectOutcome::unresolved(FailureReason::BuildFailed, tested));
        }
        if !self.runner.run_test(failure)? {
            tracing::error!(
                commit = %oldest,
                "Test already fails at the oldest commit in range, \
                 the regression predates the search window"
            );
            return Ok(BisectOutcome::unresolved(
                FailureReason::OldestCommitFailed,
                tested,
            ));
        }
        results.insert(oldest.clone(), true);

        // A failing newest bound that narrowing had to step past; resolved
        // in the final check so it is never reported as CannotReproduce.
        let mut pending_failure: Option<isize> = None;

        while low > high {
            let mut mid = high + (low - high) / 2;
            let mut commit = commits[mid as usize].clone();

            if let Some(&passed) = results.get(&commit) {
                tracing::debug!(%commit, index = mid, "Using cached result");
                if passed {
                    low = mid - 1;
                } else if mid == low {
                    return Ok(self.found(&commit, tested));
                } else if mid == high {
                    pending_failure = Some(mid);
                    high = mid + 1;
                } else {
                    high = mid;
                }
                continue;
            }

            tracing::info!(%commit, index = mid, range = ?(high, low), "Testing midpoint");
            tested.push(commit.clone());
            let mut built = self.runner.build(&commit)?;
            if !built {
                build_failures += 1;
                if build_failures >= MAX_BUILD_FAILURES {
                    tracing::warn!(
                        build_failures,
                        "Too many broken builds, falling back to linear search"
                    );
                    let mut outcome = self.linear(failure, commits)?;
                    let mut all_tested = tested;
                    all_tested.append(&mut outcome.tested_commits);
                    outcome.tested_commits = all_tested;
                    return Ok(outcome);
                }

                // Try one adjacent commit before narrowing past the
                // unbuildable one.
                if mid > high {
                    mid -= 1;
                } else if mid < low {
                    mid += 1;
                } else {
                    low = mid - 1;
                    continue;
                }

                commit = commits[mid as usize].clone();
                tracing::info!(%commit, index = mid, "Trying adjacent commit");
                tested.push(commit.clone());
                built = self.runner.build(&commit)?;
                if !built {
                    tracing::info!("Adjacent commit does not build either, narrowing range");
                    low = mid - 1;
                    continue;
                }
            }

            let passed = self.runner.run_test(failure)?;
            results.insert(commit.clone(), passed);

            if passed {
                tracing::info!(%commit, "Test passed, failure is in newer commits");
                low = mid - 1;
            } else {
                tracing::info!(%commit, "Test failed");
                if mid == low {
                    // The next-older commit passed, so this is the first
                    // failing one.
                    return Ok(self.found(&commit, tested));
                }
                if mid == high {
                    pending_failure = Some(mid);
                    high = mid + 1;
                } else {
                    high = mid;
                }
            }
        }

        // Bounds met: one candidate left.
        if low >= 0 && (low as usize) < commits.len() {
            let commit = commits[low as usize].clone();
            tracing::info!(%commit, index = low, "Testing final candidate");

            let passed = match results.get(&commit) {
                Some(&cached) => cached,
                None => {
                    tested.push(commit.clone());
                    if !self.runner.build(&commit)? {
                        tracing::error!(%commit, "Final candidate does not build, bisect incomplete");
                        return Ok(BisectOutcome::unresolved(FailureReason::BuildFailed, tested));
                    }
                    let passed = self.runner.run_test(failure)?;
                    results.insert(commit.clone(), passed);
                    passed
                }
            };

            if !passed {
                return Ok(self.found(&commit, tested));
            }
            if let Some(index) = pending_failure {
                // The candidate passes, so the failing bound we stepped
                // past is the first failing commit.
                let commit = commits[index as usize].clone();
                return Ok(self.found(&commit, tested));
            }
        }

        tracing::info!("Test passes on every commit tested, likely flaky");
        Ok(BisectOutcome::unresolved(FailureReason::CannotReproduce, tested))
    }

    fn found(&self, commit: &str, tested_commits: Vec<String>) -> BisectOutcome {
        let commit_message = self.reader.commit_message(commit);
        let pull_request = commit_message
            .as_deref()
            .and_then(pull_request_from_message);
        tracing::info!(commit, ?pull_request, "Found first failing commit");
        BisectOutcome {
            commit: Some(commit.to_string()),
            pull_request,
            commit_message,
            tested_commits,
            reason: FailureReason::Found,
        }
    }
}

/// Best-effort pull-request association: the first `#<digits>` token in a
/// commit message. Known heuristic, may match unrelated issue references.
pub fn pull_request_from_message(message: &str) -> Option<String> {
    let pattern = Regex::new(r"#(\d+)").expect("valid PR pattern");
    pattern
        .captures(message)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    use crate::models::FailureKind;

    /// Scripted oracle: failures and broken builds keyed by commit name.
    struct ScriptedRunner {
        failing: HashSet<String>,
        unbuildable: HashSet<String>,
        current: Option<String>,
        built: Vec<String>,
    }

    impl ScriptedRunner {
        fn new(failing: &[&str], unbuildable: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                unbuildable: unbuildable.iter().map(|s| s.to_string()).collect(),
                current: None,
                built: Vec::new(),
            }
        }
    }

    impl TestRunner for ScriptedRunner {
        fn build(&mut self, commit: &str) -> Result<bool> {
            self.built.push(commit.to_string());
            if self.unbuildable.contains(commit) {
                return Ok(false);
            }
            self.current = Some(commit.to_string());
            Ok(true)
        }

        fn run_test(&mut self, _failure: &Failure) -> Result<bool> {
            let current = self.current.as_ref().expect("test run before build");
            Ok(!self.failing.contains(current))
        }
    }

    struct StaticReader;

    impl CommitReader for StaticReader {
        fn commit_message(&self, commit: &str) -> Option<String> {
            Some(format!("Fix something in {commit} (#451)"))
        }
    }

    fn failure() -> Failure {
        Failure {
            test_class_name: "org.acme.HttpTest".to_string(),
            test_method_name: "testEndpoint".to_string(),
            module_path: PathBuf::from("/suite/http/minimal"),
            failure_message: None,
            kind: FailureKind::Failure,
            throwable_class: None,
            test_run_log: String::new(),
        }
    }

    fn commits(n: usize) -> Vec<String> {
        // c<n> is newest, c1 is oldest
        (1..=n).rev().map(|i| format!("c{i}")).collect()
    }

    fn bisect(
        strategy: BisectStrategy,
        range: &[String],
        failing: &[&str],
        unbuildable: &[&str],
    ) -> (BisectOutcome, usize) {
        let mut runner = ScriptedRunner::new(failing, unbuildable);
        let outcome = Bisector::new(&mut runner, &StaticReader, strategy)
            .bisect(&failure(), range)
            .unwrap();
        let built = runner.built.len();
        (outcome, built)
    }

    #[test]
    fn test_both_strategies_find_c3() {
        // Range [c5..c1], failure introduced at c3.
        let range = commits(5);
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, _) = bisect(strategy, &range, &["c5", "c4", "c3"], &[]);
            assert_eq!(outcome.reason, FailureReason::Found, "{strategy}");
            assert_eq!(outcome.commit.as_deref(), Some("c3"), "{strategy}");
            assert_eq!(outcome.pull_request.as_deref(), Some("451"));
        }
    }

    #[test]
    fn test_all_pass_is_cannot_reproduce() {
        let range = commits(5);
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, _) = bisect(strategy, &range, &[], &[]);
            assert_eq!(outcome.reason, FailureReason::CannotReproduce, "{strategy}");
            assert!(outcome.commit.is_none());
        }
    }

    #[test]
    fn test_oldest_failing_is_out_of_range() {
        let range = commits(5);
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, _) =
                bisect(strategy, &range, &["c1", "c2", "c3", "c4", "c5"], &[]);
            assert_eq!(outcome.reason, FailureReason::OldestCommitFailed, "{strategy}");
            assert!(outcome.commit.is_none());
            // validation commit was built
            assert_eq!(outcome.tested_commits, vec!["c1".to_string()]);
        }
    }

    #[test]
    fn test_unbuildable_oldest_is_build_failed() {
        let range = commits(5);
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, _) = bisect(strategy, &range, &["c5"], &["c1"]);
            assert_eq!(outcome.reason, FailureReason::BuildFailed, "{strategy}");
            assert!(outcome.commit.is_none());
        }
    }

    #[test]
    fn test_empty_range_is_cannot_reproduce() {
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, built) = bisect(strategy, &[], &["c1"], &[]);
            assert_eq!(outcome.reason, FailureReason::CannotReproduce);
            assert_eq!(built, 0);
        }
    }

    #[test]
    fn test_only_newest_failing_is_found() {
        let range = commits(6);
        for strategy in [BisectStrategy::Linear, BisectStrategy::Binary] {
            let (outcome, _) = bisect(strategy, &range, &["c6"], &[]);
            assert_eq!(outcome.reason, FailureReason::Found, "{strategy}");
            assert_eq!(outcome.commit.as_deref(), Some("c6"), "{strategy}");
        }
    }

    #[test]
    fn test_strategies_agree_on_every_breakpoint() {
        // For every possible introduction point in a 9-commit range, both
        // strategies must name the same culprit.
        let range = commits(9);
        for breakpoint in 1..=9 {
            let failing: Vec<String> = (breakpoint..=9).map(|i| format!("c{i}")).collect();
            let failing: Vec<&str> = failing.iter().map(String::as_str).collect();

            let (linear, _) = bisect(BisectStrategy::Linear, &range, &failing, &[]);
            let (binary, _) = bisect(BisectStrategy::Binary, &range, &failing, &[]);

            if breakpoint == 1 {
                assert_eq!(linear.reason, FailureReason::OldestCommitFailed);
                assert_eq!(binary.reason, FailureReason::OldestCommitFailed);
            } else {
                assert_eq!(linear.commit, binary.commit, "breakpoint c{breakpoint}");
                assert_eq!(linear.commit.as_deref(), Some(format!("c{breakpoint}").as_str()));
            }
        }
    }

    #[test]
    fn test_binary_builds_fewer_commits() {
        // Large enough range for more than two bisection steps.
        let range = commits(64);
        let failing: Vec<String> = (40..=64).map(|i| format!("c{i}")).collect();
        let failing: Vec<&str> = failing.iter().map(String::as_str).collect();

        let (linear, linear_built) = bisect(BisectStrategy::Linear, &range, &failing, &[]);
        let (binary, binary_built) = bisect(BisectStrategy::Binary, &range, &failing, &[]);

        assert_eq!(linear.commit, binary.commit);
        assert!(
            binary_built < linear_built,
            "binary built {binary_built}, linear built {linear_built}"
        );
        assert_eq!(binary.tested_commits.len(), binary_built);
        assert_eq!(linear.tested_commits.len(), linear_built);
    }

    #[test]
    fn test_linear_skips_unbuildable_commit() {
        let range = commits(5);
        // c3 introduced the failure but does not build; linear skips it and
        // reports the next failing commit it can test.
        let (outcome, _) =
            bisect(BisectStrategy::Linear, &range, &["c5", "c4", "c3"], &["c3"]);
        assert_eq!(outcome.reason, FailureReason::Found);
        assert_eq!(outcome.commit.as_deref(), Some("c4"));
        assert!(outcome.tested_commits.contains(&"c3".to_string()));
    }

    #[test]
    fn test_binary_works_around_one_broken_build() {
        let range = commits(9);
        // First midpoint (c5) is unbuildable; the adjacent probe keeps the
        // search going and the culprit is still found.
        let failing: Vec<&str> = vec!["c7", "c8", "c9"];
        let (outcome, _) = bisect(BisectStrategy::Binary, &range, &failing, &["c5"]);
        assert_eq!(outcome.reason, FailureReason::Found);
        assert_eq!(outcome.commit.as_deref(), Some("c7"));
    }

    #[test]
    fn test_binary_falls_back_to_linear_after_repeated_break() {
        // Midpoint probes land on c5 (adjacent c6 also broken) and then on
        // c8 twice, exhausting the tolerated build failures; the linear
        // sweep over the whole range still pins the culprit.
        let range = commits(9);
        let (outcome, built) = bisect(
            BisectStrategy::Binary,
            &range,
            &["c9"],
            &["c5", "c6", "c8"],
        );
        assert_eq!(outcome.reason, FailureReason::Found);
        assert_eq!(outcome.commit.as_deref(), Some("c9"));
        // tested commits span both the abandoned binary phase and the
        // linear sweep
        assert_eq!(outcome.tested_commits.len(), built);
        assert!(outcome.tested_commits.contains(&"c5".to_string()));
    }

    #[test]
    fn test_pull_request_extraction() {
        assert_eq!(
            pull_request_from_message("Merge pull request #1234 from fork/branch"),
            Some("1234".to_string())
        );
        assert_eq!(
            pull_request_from_message("Fix flaky retry (#88) and cleanup"),
            Some("88".to_string())
        );
        assert_eq!(pull_request_from_message("No reference here"), None);
    }
}
