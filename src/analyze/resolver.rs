//! Upstream change resolver.
//!
//! Decides per failure whether it is NEW, EXISTING, or (at finalize time)
//! RESOLVED, and runs a bisection for NEW failures only. Session state is
//! established lazily on the first call so a run without failures never
//! touches the repositories.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use crate::analyze::bisect::Bisector;
use crate::analyze::UpstreamChangeFinder;
use crate::config::BisectStrategy;
use crate::fs::history_store::HistoryStore;
use crate::git::range::CommitRangeProvider;
use crate::models::{Failure, FailureStatus, HistoryData, TrackedFailure, UpstreamChange};
use crate::run::TestRunner;

/// Configuration slice the resolver needs.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub lookback_days: i64,
    pub from: DateTime<Utc>,
    pub bisect_strategy: BisectStrategy,
}

/// Per-session state, created on the first `find_upstream_change` call.
struct Session {
    previous: HistoryData,
    /// Commit range shared by every NEW failure this session: they are
    /// assumed to have broken together since the last run.
    untested: Vec<String>,
    tested_this_session: Vec<String>,
    observed: Vec<TrackedFailure>,
}

/// Orchestrates history, repositories, and the bisection engine for one
/// run.
pub struct UpstreamChangeResolver {
    options: ResolverOptions,
    upstream: Box<dyn CommitRangeProvider>,
    suite: Box<dyn CommitRangeProvider>,
    runner: Box<dyn TestRunner>,
    store: Box<dyn HistoryStore>,
    session: Option<Session>,
}

impl UpstreamChangeResolver {
    pub fn new(
        options: ResolverOptions,
        upstream: Box<dyn CommitRangeProvider>,
        suite: Box<dyn CommitRangeProvider>,
        runner: Box<dyn TestRunner>,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            options,
            upstream,
            suite,
            runner,
            store,
            session: None,
        }
    }

    /// Close the session: mark previously-tracked failures that were not
    /// re-observed as resolved and persist the updated history. A session
    /// that never started (no failures analyzed) saves nothing.
    pub fn finalize(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            tracing::debug!("No analysis session was started, skipping history save");
            return Ok(());
        };

        tracing::info!("Finalizing analysis session");
        let mut failures = session.observed.clone();

        for previous in &session.previous.failures {
            let still_failing = session
                .observed
                .iter()
                .any(|f| f.matches(&previous.test_class_name, &previous.test_method_name));

            if previous.status == FailureStatus::Resolved {
                // permanent history, carried forward unchanged
                failures.push(previous.clone());
            } else if !still_failing {
                tracing::info!(
                    test = %format!("{}#{}", previous.test_class_name, previous.test_method_name),
                    "Failure no longer observed, marking resolved"
                );
                failures.push(previous.mark_resolved());
            }
        }

        let head = self
            .upstream
            .head_commit()
            .context("Failed to read upstream HEAD for history")?;

        let mut tested_commits = session.previous.tested_commits.clone();
        tested_commits.extend(session.tested_this_session);

        let resolved = failures
            .iter()
            .filter(|f| f.status == FailureStatus::Resolved)
            .count();
        let updated = HistoryData {
            last_run: Some(Utc::now()),
            last_tested_commit: Some(head),
            failures,
            tested_commits,
        };

        self.store.save(&updated)?;
        tracing::info!(
            total = updated.failures.len(),
            observed = session.observed.len(),
            resolved,
            "Saved failure history"
        );
        Ok(())
    }

    fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        tracing::info!("Initializing upstream change resolution session");
        let previous = self.store.load()?;
        tracing::info!(
            tracked = previous.failures.len(),
            tested = previous.tested_commits.len(),
            "Loaded failure history"
        );

        let target = self.lookback_target(&previous);
        self.upstream
            .ensure_history_since(target)
            .context("Failed to prepare upstream repository history")?;
        self.suite
            .ensure_history_since(target)
            .context("Failed to prepare test-suite repository")?;

        let untested = self.untested_commits(&previous, target)?;
        tracing::info!(commits = untested.len(), "Commits to test for new failures");

        self.session = Some(Session {
            previous,
            untested,
            tested_this_session: Vec::new(),
            observed: Vec::new(),
        });
        Ok(())
    }

    /// The instant history must reach back to. When a previous run exists
    /// the EARLIER of (configured lookback, last run) wins, so there is
    /// always enough history to bisect everything since that run.
    fn lookback_target(&self, previous: &HistoryData) -> DateTime<Utc> {
        let configured = self.options.from - Duration::days(self.options.lookback_days);
        match previous.last_run {
            Some(last_run) => configured.min(last_run),
            None => configured,
        }
    }

    /// The commit range NEW failures are bisected over: everything since
    /// the last tested commit, or the whole lookback window on a first run
    /// (or when the last tested commit vanished in a history rewrite).
    fn untested_commits(
        &self,
        previous: &HistoryData,
        target: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        match &previous.last_tested_commit {
            None => {
                tracing::info!(%target, "No previous run, taking all commits since target");
                self.upstream.commits_since_instant(target)
            }
            Some(last) if self.upstream.contains_commit(last) => {
                tracing::info!(last_tested = %last, "Taking commits since last tested commit");
                self.upstream.commits_after(last)
            }
            Some(last) => {
                tracing::warn!(
                    last_tested = %last,
                    "Last tested commit is gone from history, falling back to lookback window"
                );
                self.upstream.commits_since_instant(target)
            }
        }
    }
}

impl UpstreamChangeFinder for UpstreamChangeResolver {
    fn find_upstream_change(&mut self, failure: &Failure) -> Result<Option<UpstreamChange>> {
        self.ensure_session()?;

        let existing = self
            .session
            .as_ref()
            .expect("session initialized")
            .previous
            .find_active(&failure.test_class_name, &failure.test_method_name)
            .cloned();

        if let Some(previous) = existing {
            tracing::info!(
                test = %failure.test_id(),
                "EXISTING failure, reusing previous upstream attribution"
            );
            let seen = previous.mark_seen();

            let change = match &seen.upstream_commit {
                Some(commit) => {
                    let message = self.upstream.commit_message(commit);
                    Some(UpstreamChange::found(
                        commit.clone(),
                        seen.upstream_pull_request.clone(),
                        message,
                    ))
                }
                None => None,
            };

            self.session
                .as_mut()
                .expect("session initialized")
                .observed
                .push(seen);
            return Ok(change);
        }

        tracing::info!(test = %failure.test_id(), "NEW failure, starting bisection");
        let mut tracked = TrackedFailure::new(
            failure.test_class_name.clone(),
            failure.test_method_name.clone(),
            failure.module_path.clone(),
        );

        let session = self.session.as_mut().expect("session initialized");
        let outcome = Bisector::new(
            self.runner.as_mut(),
            &*self.upstream,
            self.options.bisect_strategy,
        )
        .bisect(failure, &session.untested)?;

        session
            .tested_this_session
            .extend(outcome.tested_commits.iter().cloned());

        let change = match &outcome.commit {
            Some(commit) => {
                tracing::info!(
                    commit = %commit,
                    pull_request = ?outcome.pull_request,
                    "Attributed failure to upstream commit"
                );
                tracked = tracked.with_upstream_commit(commit.clone(), outcome.pull_request.clone());
                UpstreamChange::found(
                    commit.clone(),
                    outcome.pull_request.clone(),
                    outcome.commit_message.clone(),
                )
            }
            None => {
                tracing::info!(reason = %outcome.reason, "Could not attribute failure");
                UpstreamChange::unresolved(outcome.reason)
            }
        };

        session.observed.push(tracked);
        Ok(Some(change))
    }
}
