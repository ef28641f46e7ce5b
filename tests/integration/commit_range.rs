//! Commit range provider against real repositories.

use chrono::{Duration, Utc};
use serial_test::serial;

use culprit::git::{CommitRangeProvider, CommitReader, GitCommitRange};

use super::helpers::init_upstream_repo;

#[test]
#[serial]
fn test_head_commit_is_branch_tip() {
    let (repo, commits) = init_upstream_repo(&["ok", "ok", "ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    assert_eq!(provider.head_commit().unwrap(), commits[0]);
}

#[test]
#[serial]
fn test_commits_after_excludes_the_boundary() {
    let (repo, commits) = init_upstream_repo(&["ok", "ok", "ok", "ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    let oldest = commits.last().unwrap();
    let range = provider.commits_after(oldest).unwrap();

    assert_eq!(range, commits[..commits.len() - 1].to_vec());
}

#[test]
#[serial]
fn test_commits_since_instant_returns_newest_first() {
    let (repo, commits) = init_upstream_repo(&["ok", "ok", "ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    let range = provider
        .commits_since_instant(Utc::now() - Duration::days(1))
        .unwrap();

    assert_eq!(range, commits);
    // strictly newest-to-oldest, no duplicates
    let mut deduped = range.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), range.len());
}

#[test]
#[serial]
fn test_contains_commit() {
    let (repo, commits) = init_upstream_repo(&["ok", "ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    assert!(provider.contains_commit(&commits[0]));
    assert!(!provider.contains_commit("0000000000000000000000000000000000000000"));
}

#[test]
#[serial]
fn test_commit_message_and_missing_commit() {
    let (repo, commits) = init_upstream_repo(&["ok", "ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    let message = provider.commit_message(&commits[0]).unwrap();
    assert!(message.contains("Change 1"));
    assert!(message.contains("#101"));

    assert_eq!(
        provider.commit_message("0000000000000000000000000000000000000000"),
        None
    );
}

#[test]
#[serial]
fn test_ensure_history_is_a_no_op_on_complete_clones() {
    let (repo, _) = init_upstream_repo(&["ok"]);
    let provider = GitCommitRange::open(repo.path(), "main");

    provider
        .ensure_history_since(Utc::now() - Duration::days(30))
        .unwrap();
}
