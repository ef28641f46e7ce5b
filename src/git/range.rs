//! Commit range provider.
//!
//! Guarantees a repository's local history reaches a target instant and
//! answers first-parent commit-range queries, newest first. Shallow clones
//! are deepened incrementally rather than cloned at full depth: upstream
//! histories are large and most runs only need a few days of them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::git::runner::{git_ok, git_output, git_stdout};

/// How many commits each deepening fetch asks for. `--deepen` moves the
/// shallow boundary, so a step may pull more than this on busy branches.
const DEEPEN_STEP: u32 = 10;

/// Safety cap on deepening rounds.
const MAX_DEEPEN_ITERATIONS: u32 = 100;

/// Commit-message lookup, the only repository access the bisection engine
/// needs. Split out so engine tests script it without a real repository.
pub trait CommitReader {
    /// Full commit message, or None when the commit cannot be read.
    fn commit_message(&self, commit: &str) -> Option<String>;
}

/// Read access to one repository's first-parent commit history.
///
/// The resolver consumes this trait; tests swap in scripted
/// implementations.
pub trait CommitRangeProvider: CommitReader {
    /// Make sure local history reaches back to `instant` (deepening a
    /// shallow clone as needed). No-op when history is already complete.
    fn ensure_history_since(&self, instant: DateTime<Utc>) -> Result<()>;

    /// First-parent commits from HEAD back to `instant`, newest first.
    fn commits_since_instant(&self, instant: DateTime<Utc>) -> Result<Vec<String>>;

    /// First-parent commits strictly after `commit` up to HEAD, newest
    /// first.
    fn commits_after(&self, commit: &str) -> Result<Vec<String>>;

    /// Whether `commit` is present in local history.
    fn contains_commit(&self, commit: &str) -> bool;

    fn head_commit(&self) -> Result<String>;
}

/// A git working copy addressed through the `git` CLI.
pub struct GitCommitRange {
    repo: PathBuf,
    branch: String,
    remote_url: Option<String>,
}

impl GitCommitRange {
    /// Use an existing local repository as-is.
    pub fn open(repo: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            remote_url: None,
        }
    }

    /// A repository materialized from `url` on first use: cloning and
    /// updating happen inside [`CommitRangeProvider::ensure_history_since`]
    /// so that constructing the provider stays cheap.
    pub fn remote(
        url: impl Into<String>,
        repo: impl Into<PathBuf>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            remote_url: Some(url.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.repo
    }

    /// Clone (depth 1, single branch) or fast-forward the working copy to
    /// its origin.
    fn sync_remote(&self, url: &str) -> Result<()> {
        let branch = self.branch.as_str();
        if self.repo.join(".git").exists() {
            tracing::info!(repo = %self.repo.display(), "Updating existing clone");
            git_stdout(&self.repo, &["fetch", "origin", branch])?;
            git_stdout(&self.repo, &["checkout", branch])?;
            git_stdout(&self.repo, &["reset", "--hard", &format!("origin/{branch}")])?;
        } else {
            tracing::info!(url, repo = %self.repo.display(), "Cloning (depth 1)");
            let parent = self
                .repo
                .parent()
                .context("Clone target has no parent directory")?;
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            let name = self
                .repo
                .file_name()
                .and_then(|n| n.to_str())
                .context("Clone target has no directory name")?;
            git_stdout(
                parent,
                &[
                    "clone",
                    "--depth=1",
                    "--single-branch",
                    &format!("--branch={branch}"),
                    url,
                    name,
                ],
            )?;
        }
        Ok(())
    }

    fn is_shallow(&self) -> bool {
        git_stdout(&self.repo, &["rev-parse", "--is-shallow-repository"])
            .map(|out| out == "true")
            .unwrap_or(false)
    }

    fn first_parent_count(&self) -> Result<u64> {
        let count = git_stdout(&self.repo, &["rev-list", "--count", "--first-parent", "HEAD"])?;
        count
            .parse()
            .with_context(|| format!("Unexpected rev-list count output: {count}"))
    }

    /// Committer date of the oldest first-parent merge commit, or None when
    /// no merge commit is visible yet. Merge dates are used rather than
    /// author dates: a change lands on the branch timeline when it is
    /// merged, not when its commits were originally written.
    fn oldest_merge_date(&self) -> Result<Option<DateTime<Utc>>> {
        let output = git_stdout(
            &self.repo,
            &["log", "--first-parent", "--merges", "--format=%cI", "HEAD"],
        )?;

        let oldest = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| DateTime::parse_from_rfc3339(line.trim()).ok())
            .map(|date| date.with_timezone(&Utc))
            .min();

        Ok(oldest)
    }

    fn rev_list(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = git_stdout(&self.repo, args)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl CommitRangeProvider for GitCommitRange {
    fn ensure_history_since(&self, instant: DateTime<Utc>) -> Result<()> {
        if let Some(url) = &self.remote_url {
            self.sync_remote(url)?;
        }
        if !self.is_shallow() {
            return Ok(());
        }

        let mut previous_count = 0;
        for iteration in 1..=MAX_DEEPEN_ITERATIONS {
            tracing::info!(iteration, "Deepening shallow clone");
            git_stdout(
                &self.repo,
                &[
                    "fetch",
                    &format!("--deepen={DEEPEN_STEP}"),
                    "origin",
                    &self.branch,
                ],
            )?;

            let count = self.first_parent_count()?;
            tracing::debug!(commits = count, "First-parent history size");
            if count == previous_count {
                tracing::info!("No new commits fetched, reached the root of history");
                return Ok(());
            }
            previous_count = count;

            match self.oldest_merge_date()? {
                Some(oldest) if oldest <= instant => {
                    tracing::info!(%oldest, target = %instant, "History reaches target instant");
                    return Ok(());
                }
                Some(oldest) => {
                    tracing::debug!(%oldest, target = %instant, "Deepening further");
                }
                None => {
                    tracing::debug!("No merge commits visible yet, deepening further");
                }
            }
        }

        tracing::warn!(
            max = MAX_DEEPEN_ITERATIONS,
            "Hit deepening iteration cap before reaching target instant"
        );
        Ok(())
    }

    fn commits_since_instant(&self, instant: DateTime<Utc>) -> Result<Vec<String>> {
        // ranges are relative to the branch tip: a bisection may have left
        // HEAD detached on an old commit
        self.rev_list(&[
            "rev-list",
            "--first-parent",
            &format!("--since={}", instant.to_rfc3339()),
            &self.branch,
        ])
    }

    fn commits_after(&self, commit: &str) -> Result<Vec<String>> {
        self.rev_list(&[
            "rev-list",
            "--first-parent",
            &format!("{commit}..{}", self.branch),
        ])
    }

    fn contains_commit(&self, commit: &str) -> bool {
        git_ok(&self.repo, &["cat-file", "-e", commit])
    }

    fn head_commit(&self) -> Result<String> {
        // the branch tip, not HEAD: bisection leaves the working copy on a
        // detached checkout
        git_stdout(&self.repo, &["rev-parse", &self.branch])
    }
}

impl CommitReader for GitCommitRange {
    fn commit_message(&self, commit: &str) -> Option<String> {
        match git_output(&self.repo, &["log", "--format=%B", "-n", "1", commit]) {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            _ => None,
        }
    }
}
