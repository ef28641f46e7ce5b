//! Git command execution.
//!
//! Small wrappers around `git` subprocess invocations with consistent
//! error context, shared by the commit range provider and the build
//! runner's checkouts.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Output};

/// Run a git command in `repo` and return the raw Output.
pub fn git_output(repo: &Path, args: &[&str]) -> Result<Output> {
    tracing::debug!(args = %args.join(" "), repo = %repo.display(), "git");
    Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("Failed to execute: git {}", args.join(" ")))
}

/// Run a git command, require success, return trimmed stdout.
pub fn git_stdout(repo: &Path, args: &[&str]) -> Result<String> {
    let output = git_output(repo, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git {} failed in {}: {}",
            args.join(" "),
            repo.display(),
            stderr.trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a git command, returning whether it exited 0. Spawn failures count
/// as false; use only for existence-style probes.
pub fn git_ok(repo: &Path, args: &[&str]) -> bool {
    git_output(repo, args)
        .map(|output| output.status.success())
        .unwrap_or(false)
}
