//! Shared helpers: on-the-fly upstream repositories and a runner that
//! evaluates tests from a marker file in the working copy.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::Result;
use tempfile::TempDir;

use culprit::models::{Failure, FailureKind};
use culprit::run::TestRunner;

/// Marker content that makes [`MarkerRunner`] report a failing test.
pub const BROKEN: &str = "broken";

fn git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a repository with one commit per marker value (given oldest
/// first) and return the commit SHAs newest first.
pub fn init_upstream_repo(markers: &[&str]) -> (TempDir, Vec<String>) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let repo = temp_dir.path();

    git(repo, &["init", "-b", "main"]);
    git(repo, &["config", "user.email", "test@test.com"]);
    git(repo, &["config", "user.name", "Test User"]);

    for (index, marker) in markers.iter().enumerate() {
        fs::write(repo.join("marker.txt"), marker).expect("Failed to write marker");
        git(repo, &["add", "."]);
        git(
            repo,
            &["commit", "--allow-empty", "-m", &format!("Change {index} (#{})", 100 + index)],
        );
    }

    let output = Command::new("git")
        .args(["rev-list", "--first-parent", "HEAD"])
        .current_dir(repo)
        .output()
        .expect("Failed to list commits");
    let commits = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();

    (temp_dir, commits)
}

/// Build/test primitives over a marker-file repository: "building" checks
/// the commit out, the "test" fails when the marker says so.
pub struct MarkerRunner {
    repo: PathBuf,
    builds: Rc<RefCell<usize>>,
}

impl MarkerRunner {
    pub fn new(repo: &Path, builds: Rc<RefCell<usize>>) -> Self {
        Self {
            repo: repo.to_path_buf(),
            builds,
        }
    }
}

impl TestRunner for MarkerRunner {
    fn build(&mut self, commit: &str) -> Result<bool> {
        *self.builds.borrow_mut() += 1;
        git(&self.repo, &["checkout", commit]);
        Ok(true)
    }

    fn run_test(&mut self, _failure: &Failure) -> Result<bool> {
        let marker = fs::read_to_string(self.repo.join("marker.txt"))?;
        Ok(marker.trim() != BROKEN)
    }
}

pub fn failure(class: &str, method: &str) -> Failure {
    Failure {
        test_class_name: class.to_string(),
        test_method_name: method.to_string(),
        module_path: PathBuf::from("/suite/http/minimal"),
        failure_message: Some("expected 200 but was 500".to_string()),
        kind: FailureKind::Failure,
        throwable_class: Some("java.lang.AssertionError".to_string()),
        test_run_log: String::new(),
    }
}
