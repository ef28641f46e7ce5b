//! Run configuration.
//!
//! All configuration is resolved up front (CLI flags plus defaults) and
//! passed into component constructors at run assembly time; nothing reads
//! configuration from ambient state after startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Search strategy for locating the failure-introducing commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BisectStrategy {
    /// Binary search through commits (faster, default)
    Binary,
    /// Linear search from oldest to newest (slower, more predictable)
    Linear,
}

impl std::fmt::Display for BisectStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BisectStrategy::Binary => write!(f, "binary"),
            BisectStrategy::Linear => write!(f, "linear"),
        }
    }
}

impl std::str::FromStr for BisectStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(BisectStrategy::Binary),
            "linear" => Ok(BisectStrategy::Linear),
            _ => anyhow::bail!("Invalid bisect strategy: {s}. Valid values: binary, linear"),
        }
    }
}

/// Resolved configuration for one `analyze` run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// How far back in upstream history to search, in days
    pub lookback_days: i64,
    /// Reference instant the lookback is measured from
    pub from: DateTime<Utc>,
    /// Where the failure history JSON lives
    pub history_file: PathBuf,
    /// Optional file the rendered report is written to
    pub output_file: Option<PathBuf>,
    pub bisect_strategy: BisectStrategy,
    /// Upstream dependency repository (the one bisected)
    pub upstream_repo_url: String,
    /// Repository holding the test suite the failures come from
    pub test_suite_repo_url: String,
    /// Directory the working clones are kept in; a temp dir when unset
    pub workspace_dir: Option<PathBuf>,
    /// Upper bound for a single build or test command
    pub command_timeout: Option<Duration>,
    /// Builder image property passed to native-image test runs
    pub native_builder_image: Option<String>,
}

impl AppConfig {
    /// Default location of the failure history file:
    /// `<data dir>/culprit/failure-history.json`, falling back to the
    /// current directory when no data dir is available.
    pub fn default_history_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("culprit"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("failure-history.json")
    }
}
