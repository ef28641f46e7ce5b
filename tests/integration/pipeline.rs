//! End-to-end resolver runs over a real repository and a real history
//! file: first run bisects, second run reuses the attribution, a run
//! without the failure resolves it.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use chrono::Utc;
use serial_test::serial;

use culprit::analyze::{FailureAnalyzer, ResolverOptions, UpstreamChangeResolver};
use culprit::config::BisectStrategy;
use culprit::fs::{HistoryStore, JsonHistoryStore};
use culprit::git::GitCommitRange;
use culprit::models::{FailureReason, FailureStatus};

use super::helpers::{failure, init_upstream_repo, MarkerRunner, BROKEN};

fn resolver(
    repo: &Path,
    history_file: &Path,
    strategy: BisectStrategy,
    builds: Rc<RefCell<usize>>,
) -> UpstreamChangeResolver {
    UpstreamChangeResolver::new(
        ResolverOptions {
            lookback_days: 5,
            from: Utc::now(),
            bisect_strategy: strategy,
        },
        Box::new(GitCommitRange::open(repo, "main")),
        Box::new(GitCommitRange::open(repo, "main")),
        Box::new(MarkerRunner::new(repo, builds)),
        Box::new(JsonHistoryStore::new(history_file)),
    )
}

#[test]
#[serial]
fn test_first_run_bisects_then_second_run_reuses_attribution() {
    let markers = ["ok", "ok", "ok", BROKEN, BROKEN, BROKEN];
    let (repo, commits) = init_upstream_repo(&markers);
    // newest-first commit list: the culprit is the oldest broken one
    let culprit_commit = commits[2].clone();

    let history_dir = tempfile::TempDir::new().unwrap();
    let history_file = history_dir.path().join("failure-history.json");

    // First run: the failure is NEW and gets bisected.
    let builds = Rc::new(RefCell::new(0));
    let mut resolver_one = resolver(
        repo.path(),
        &history_file,
        BisectStrategy::Binary,
        builds.clone(),
    );
    {
        let mut analyzer = FailureAnalyzer::new(&mut resolver_one);
        let cause = analyzer.analyze(&failure("org.acme.HttpTest", "testGet")).unwrap();

        let change = cause.upstream_change.expect("bisection outcome");
        assert_eq!(change.reason, FailureReason::Found);
        assert_eq!(change.commit.as_deref(), Some(culprit_commit.as_str()));
        assert!(change.commit_message.unwrap().contains("Change 3"));
    }
    resolver_one.finalize().unwrap();
    assert!(*builds.borrow() > 0);

    let saved = JsonHistoryStore::new(&history_file).load().unwrap();
    assert_eq!(saved.last_tested_commit.as_deref(), Some(commits[0].as_str()));
    let tracked = saved.find_active("org.acme.HttpTest", "testGet").unwrap();
    assert_eq!(tracked.status, FailureStatus::New);
    assert_eq!(tracked.upstream_commit.as_deref(), Some(culprit_commit.as_str()));

    // Second run: the same failure is EXISTING, no bisection happens.
    let builds_two = Rc::new(RefCell::new(0));
    let mut resolver_two = resolver(
        repo.path(),
        &history_file,
        BisectStrategy::Binary,
        builds_two.clone(),
    );
    {
        let mut analyzer = FailureAnalyzer::new(&mut resolver_two);
        let cause = analyzer.analyze(&failure("org.acme.HttpTest", "testGet")).unwrap();

        let change = cause.upstream_change.expect("cached attribution");
        assert_eq!(change.reason, FailureReason::Found);
        assert_eq!(change.commit.as_deref(), Some(culprit_commit.as_str()));
    }
    resolver_two.finalize().unwrap();
    assert_eq!(*builds_two.borrow(), 0);

    let saved = JsonHistoryStore::new(&history_file).load().unwrap();
    let tracked = saved.find_active("org.acme.HttpTest", "testGet").unwrap();
    assert_eq!(tracked.status, FailureStatus::Existing);
}

#[test]
#[serial]
fn test_run_without_the_failure_resolves_it() {
    let markers = ["ok", "ok", BROKEN];
    let (repo, _) = init_upstream_repo(&markers);

    let history_dir = tempfile::TempDir::new().unwrap();
    let history_file = history_dir.path().join("failure-history.json");

    let builds = Rc::new(RefCell::new(0));
    let mut first = resolver(repo.path(), &history_file, BisectStrategy::Binary, builds);
    {
        let mut analyzer = FailureAnalyzer::new(&mut first);
        analyzer.analyze(&failure("org.acme.OldTest", "testOld")).unwrap();
    }
    first.finalize().unwrap();

    // Next run observes a different failure; nothing new to bisect because
    // every commit up to the tip was already covered.
    let builds = Rc::new(RefCell::new(0));
    let mut second = resolver(repo.path(), &history_file, BisectStrategy::Binary, builds);
    {
        let mut analyzer = FailureAnalyzer::new(&mut second);
        let cause = analyzer.analyze(&failure("org.acme.NewTest", "testNew")).unwrap();
        let change = cause.upstream_change.expect("outcome for new failure");
        assert_eq!(change.reason, FailureReason::CannotReproduce);
    }
    second.finalize().unwrap();

    let saved = JsonHistoryStore::new(&history_file).load().unwrap();
    let old = saved
        .failures
        .iter()
        .find(|f| f.test_class_name == "org.acme.OldTest")
        .unwrap();
    assert_eq!(old.status, FailureStatus::Resolved);
    let new = saved.find_active("org.acme.NewTest", "testNew").unwrap();
    assert_eq!(new.status, FailureStatus::New);
}

#[test]
#[serial]
fn test_linear_strategy_agrees_with_binary_on_a_real_repository() {
    let markers = ["ok", "ok", BROKEN, BROKEN];
    let (repo_a, commits) = init_upstream_repo(&markers);
    let culprit_commit = commits[1].clone();

    let dir = tempfile::TempDir::new().unwrap();

    let mut found = Vec::new();
    for (strategy, history_name) in [
        (BisectStrategy::Binary, "binary.json"),
        (BisectStrategy::Linear, "linear.json"),
    ] {
        let builds = Rc::new(RefCell::new(0));
        let mut r = resolver(
            repo_a.path(),
            &dir.path().join(history_name),
            strategy,
            builds,
        );
        {
            let mut analyzer = FailureAnalyzer::new(&mut r);
            let cause = analyzer.analyze(&failure("org.acme.T", "m")).unwrap();
            found.push(cause.upstream_change.unwrap().commit);
        }
        r.finalize().unwrap();
    }

    assert_eq!(found[0].as_deref(), Some(culprit_commit.as_str()));
    assert_eq!(found[0], found[1]);
}
