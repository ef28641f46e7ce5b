//! Durable failure-tracking records persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle of a tracked failure.
///
/// `New` on first sighting, `Existing` on every later sighting, `Resolved`
/// once a run completes without the failure reappearing. Resolved entries
/// are permanent history: they are never reverted, and a later recurrence
/// of the same test creates a fresh `New` entry alongside them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStatus {
    New,
    Existing,
    Resolved,
}

impl std::fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStatus::New => write!(f, "new"),
            FailureStatus::Existing => write!(f, "existing"),
            FailureStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// One test failure tracked across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedFailure {
    pub test_class_name: String,
    pub test_method_name: String,
    pub module_path: PathBuf,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: FailureStatus,
    /// Upstream commit previously attributed to this failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_pull_request: Option<String>,
}

impl TrackedFailure {
    /// A failure sighted for the first time.
    pub fn new(test_class_name: String, test_method_name: String, module_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            test_class_name,
            test_method_name,
            module_path,
            first_seen: now,
            last_seen: now,
            status: FailureStatus::New,
            upstream_commit: None,
            upstream_pull_request: None,
        }
    }

    /// Sighted again in a later run: refresh `last_seen`, keep attribution.
    pub fn mark_seen(&self) -> Self {
        Self {
            last_seen: Utc::now(),
            status: FailureStatus::Existing,
            ..self.clone()
        }
    }

    /// Not observed this run: close the entry out.
    pub fn mark_resolved(&self) -> Self {
        Self {
            last_seen: Utc::now(),
            status: FailureStatus::Resolved,
            ..self.clone()
        }
    }

    pub fn with_upstream_commit(&self, commit: String, pull_request: Option<String>) -> Self {
        Self {
            upstream_commit: Some(commit),
            upstream_pull_request: pull_request,
            ..self.clone()
        }
    }

    pub fn matches(&self, test_class_name: &str, test_method_name: &str) -> bool {
        self.test_class_name == test_class_name && self.test_method_name == test_method_name
    }
}

/// Everything the tool remembers between runs. Loaded once at process
/// start, replaced wholesale on save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Upstream HEAD at the end of the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tested_commit: Option<String>,
    #[serde(default)]
    pub failures: Vec<TrackedFailure>,
    /// Every commit ever built during a bisection
    #[serde(default)]
    pub tested_commits: Vec<String>,
}

impl HistoryData {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up the live (non-resolved) entry for a test, if any.
    ///
    /// Resolved entries are historical record only; a recurrence after
    /// resolution is treated as a brand-new failure.
    pub fn find_active(&self, test_class_name: &str, test_method_name: &str) -> Option<&TrackedFailure> {
        self.failures
            .iter()
            .find(|f| f.status != FailureStatus::Resolved && f.matches(test_class_name, test_method_name))
    }

    pub fn is_commit_tested(&self, commit: &str) -> bool {
        self.tested_commits.iter().any(|c| c == commit)
    }
}
