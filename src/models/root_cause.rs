//! Root-cause grouping results.
//!
//! A `RootCause` collects every failure believed to share one triggering
//! change. Values are snapshots: adding a failure produces a new value, the
//! grouping tables swap the old snapshot for the new one.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::failure::{Failure, FailureKind};

/// How confident the grouping engine is that the grouped failures really
/// share one cause. Fixed when the group is created, never recomputed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    /// Failures from the same test class
    High,
    /// Failures from the same module
    Medium,
    /// Guessed or inferred relationship
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Strategy a root cause was grouped under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// Each failure analyzed individually
    None,
    /// Failures grouped by test class
    ByClass,
    /// Failures grouped by module path
    ByModule,
}

/// Snapshot of one failure inside a root cause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetails {
    pub test_class_name: String,
    pub test_method_name: String,
    pub failure_message: Option<String>,
    pub throwable_class: Option<String>,
    pub kind: FailureKind,
    /// First failure seen for the group; later arrivals are deduplicated
    pub primary: bool,
}

impl FailureDetails {
    pub fn from_failure(failure: &Failure, primary: bool) -> Self {
        Self {
            test_class_name: failure.test_class_name.clone(),
            test_method_name: failure.test_method_name.clone(),
            failure_message: failure.failure_message.clone(),
            throwable_class: failure.throwable_class.clone(),
            kind: failure.kind,
            primary,
        }
    }
}

/// Bookkeeping for one root cause. Counts only grow within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub strategy: GroupingStrategy,
    pub total_failures: u32,
    pub deduped_failures: u32,
}

impl AnalysisMetadata {
    pub fn new(strategy: GroupingStrategy) -> Self {
        Self {
            analyzed_at: Utc::now(),
            strategy,
            total_failures: 1,
            deduped_failures: 0,
        }
    }

    /// Metadata for a snapshot that gained one deduplicated failure.
    pub fn with_deduped_failure(&self) -> Self {
        Self {
            analyzed_at: self.analyzed_at,
            strategy: self.strategy,
            total_failures: self.total_failures + 1,
            deduped_failures: self.deduped_failures + 1,
        }
    }
}

/// Terminal outcome of a bisection attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The commit that introduced the failure was identified
    Found,
    /// A commit needed to continue could not be built
    BuildFailed,
    /// The test already fails at the oldest commit in range
    OldestCommitFailed,
    /// The test passes on every commit tested
    CannotReproduce,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Found => write!(f, "found"),
            FailureReason::BuildFailed => write!(f, "build-failed"),
            FailureReason::OldestCommitFailed => write!(f, "oldest-commit-failed"),
            FailureReason::CannotReproduce => write!(f, "cannot-reproduce"),
        }
    }
}

/// The upstream commit a root cause is attributed to, or why no commit
/// could be determined. `commit` is present exactly when `reason` is
/// [`FailureReason::Found`]; the constructors maintain that invariant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamChange {
    pub commit: Option<String>,
    pub pull_request: Option<String>,
    pub commit_message: Option<String>,
    pub reason: FailureReason,
}

impl UpstreamChange {
    pub fn found(
        commit: String,
        pull_request: Option<String>,
        commit_message: Option<String>,
    ) -> Self {
        Self {
            commit: Some(commit),
            pull_request,
            commit_message,
            reason: FailureReason::Found,
        }
    }

    pub fn unresolved(reason: FailureReason) -> Self {
        Self {
            commit: None,
            pull_request: None,
            commit_message: None,
            reason,
        }
    }
}

/// A group of failures believed to share one triggering change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RootCause {
    /// `CLASS:<name>` or `MODULE:<path>`
    pub identifier: String,
    pub module_path: PathBuf,
    pub summary: String,
    pub confidence: Confidence,
    /// Never empty; the first element is the primary failure
    pub failures: Vec<FailureDetails>,
    pub metadata: AnalysisMetadata,
    pub upstream_change: Option<UpstreamChange>,
}

impl RootCause {
    /// Create a root cause from its primary failure.
    pub fn from_primary(
        identifier: String,
        summary: String,
        confidence: Confidence,
        failure: &Failure,
        strategy: GroupingStrategy,
        upstream_change: Option<UpstreamChange>,
    ) -> Self {
        Self {
            identifier,
            module_path: failure.module_path.clone(),
            summary,
            confidence,
            failures: vec![FailureDetails::from_failure(failure, true)],
            metadata: AnalysisMetadata::new(strategy),
            upstream_change,
        }
    }

    /// New snapshot with a deduplicated failure appended.
    pub fn with_failure(&self, details: FailureDetails) -> Self {
        let mut failures = self.failures.clone();
        failures.push(details);
        Self {
            identifier: self.identifier.clone(),
            module_path: self.module_path.clone(),
            summary: self.summary.clone(),
            confidence: self.confidence,
            failures,
            metadata: self.metadata.with_deduped_failure(),
            upstream_change: self.upstream_change.clone(),
        }
    }

    /// The first failure seen for this group.
    pub fn primary(&self) -> &FailureDetails {
        &self.failures[0]
    }
}
