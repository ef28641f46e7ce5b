//! Maven build & test runner.
//!
//! Builds the upstream dependency at a given commit with the quick build
//! profile and runs one named test from the suite against it. Non-zero
//! exits are expected signals (broken build, failing test); only a command
//! that cannot be launched aborts the run.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::git::runner::git_stdout;
use crate::models::Failure;
use crate::run::process::{CapturedCommand, CommandError};
use crate::run::TestRunner;

/// Version reported when the upstream pom cannot be evaluated.
const FALLBACK_VERSION: &str = "999-SNAPSHOT";

/// Runs builds and tests through Maven working copies.
pub struct MavenRunner {
    upstream_repo: PathBuf,
    suite_repo: PathBuf,
    timeout: Option<Duration>,
    native_builder_image: Option<String>,
    log_dir: PathBuf,
}

impl MavenRunner {
    pub fn new(upstream_repo: PathBuf, suite_repo: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            upstream_repo,
            suite_repo,
            timeout: None,
            native_builder_image: None,
            log_dir,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_native_builder_image(mut self, image: Option<String>) -> Self {
        self.native_builder_image = image;
        self
    }

    /// Version of the upstream project as built, passed to the suite so it
    /// resolves the locally-built artifacts.
    fn upstream_version(&self) -> String {
        let result = CapturedCommand::new("mvn")
            .args([
                "help:evaluate",
                "-Dexpression=project.version",
                "-q",
                "-DforceStdout",
            ])
            .run(&self.upstream_repo);

        match result {
            Ok(output) => output.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to evaluate upstream version, using fallback");
                FALLBACK_VERSION.to_string()
            }
        }
    }

    /// Module path relative to the suite repository root.
    ///
    /// Report module paths are absolute and come either from a checkout of
    /// the suite or from an extracted CI-artifact directory; in both cases
    /// the leading machinery has to be stripped before the path can be fed
    /// to `mvn -f`.
    fn module_relative_path(&self, failure: &Failure) -> String {
        let suite_name = self
            .suite_repo
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        module_relative_path(failure.module_path(), suite_name)
    }

    fn save_log(&self, prefix: &str, content: &str) {
        let name = format!("{prefix}-{}.log", Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let path = self.log_dir.join(name);
        if let Err(err) = fs::create_dir_all(&self.log_dir).and_then(|_| fs::write(&path, content)) {
            tracing::warn!(error = %err, "Failed to save log file");
        } else {
            tracing::info!(path = %path.display(), "Full log saved");
        }
    }
}

impl TestRunner for MavenRunner {
    fn build(&mut self, commit: &str) -> Result<bool> {
        git_stdout(&self.upstream_repo, &["checkout", commit])
            .with_context(|| format!("Failed to check out commit {commit}"))?;

        tracing::info!(commit, "Building upstream with quick profile");
        let result = CapturedCommand::new("./mvnw")
            .arg("-Dquickly")
            .env("MAVEN_OPTS", "-Xmx4g")
            .timeout(self.timeout)
            .run(&self.upstream_repo);

        match result {
            Ok(_) => Ok(true),
            Err(CommandError::Failed { status, output, .. }) => {
                self.save_log(&format!("build-failed-{}", short_sha(commit)), &output);
                tracing::error!(commit, status, "Build failed:\n{}", build_excerpt(&output));
                Ok(false)
            }
            Err(CommandError::TimedOut { timeout, .. }) => {
                tracing::error!(commit, ?timeout, "Build timed out, treating as build failure");
                Ok(false)
            }
            Err(err @ CommandError::Io { .. }) => {
                Err(err).context("Build command could not be run")
            }
        }
    }

    fn run_test(&mut self, failure: &Failure) -> Result<bool> {
        let simple_class = failure.simple_class_name().to_string();
        let module = self.module_relative_path(failure);
        let native = failure
            .module_path()
            .to_string_lossy()
            .to_lowercase()
            .contains("native");
        let version = self.upstream_version();

        tracing::info!(
            test = %simple_class,
            %module,
            mode = if native { "NATIVE" } else { "JVM" },
            %version,
            "Running test"
        );

        let mut command = CapturedCommand::new("mvn")
            .args(["-fae", "-V", "-B", "--no-transfer-progress", "clean", "verify"])
            .arg(format!("-Dit.test={simple_class}"))
            .arg(format!("-Dplatform.version={version}"));

        if native {
            command = command.arg("-Dnative");
            if let Some(image) = &self.native_builder_image {
                command = command.arg(format!("-Dnative.builder-image={image}"));
            }
        }

        let result = command
            .arg("-f")
            .arg(module)
            .timeout(self.timeout)
            .run(&self.suite_repo);

        match result {
            Ok(_) => {
                tracing::info!(test = %simple_class, "Test PASSED");
                Ok(true)
            }
            Err(CommandError::Failed { output, .. }) => {
                tracing::info!(test = %simple_class, "Test FAILED");
                self.save_log(&format!("test-failed-{simple_class}"), &output);
                tracing::info!("Failure details:\n{}", test_excerpt(&output));
                Ok(false)
            }
            Err(CommandError::TimedOut { timeout, .. }) => {
                tracing::error!(test = %simple_class, ?timeout, "Test timed out, counting as failure");
                Ok(false)
            }
            Err(err @ CommandError::Io { .. }) => {
                Err(err).context("Test command could not be run")
            }
        }
    }
}

fn short_sha(commit: &str) -> &str {
    &commit[..commit.len().min(8)]
}

/// Strip report-directory suffixes and leading checkout/artifact machinery
/// from an absolute module path.
fn module_relative_path(module_path: &Path, suite_name: &str) -> String {
    let trimmed = strip_report_suffix(module_path);

    let components: Vec<&str> = trimmed
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    // Path inside a checkout of the suite repository.
    if !suite_name.is_empty() {
        if let Some(pos) = components.iter().position(|part| *part == suite_name) {
            if pos + 1 < components.len() {
                return components[pos + 1..].join("/");
            }
        }
    }

    // Path inside an extracted CI-artifact directory: skip the temp dir and
    // the artifact's own top-level directory.
    if let Some(pos) = components
        .iter()
        .position(|part| part.starts_with("culprit-artifacts-"))
    {
        let mut start = pos + 1;
        if components
            .get(start)
            .is_some_and(|part| part.starts_with("artifacts-"))
        {
            start += 1;
        }
        if start < components.len() {
            return components[start..].join("/");
        }
    }

    // Unknown layout: guess the last two components.
    let tail = components.len().saturating_sub(2);
    let guess = components[tail..].join("/");
    tracing::debug!(path = %module_path.display(), %guess, "Guessing module path");
    guess
}

fn strip_report_suffix(path: &Path) -> &Path {
    for suffix in ["target/failsafe-reports", "failsafe-reports", "target"] {
        if path.ends_with(suffix) {
            let mut trimmed = path;
            for _ in suffix.split('/') {
                trimmed = trimmed.parent().unwrap_or(trimmed);
            }
            return trimmed;
        }
    }
    path
}

/// Excerpt a failed build log: `[ERROR]` lines with two lines of context,
/// or the last 50 lines when Maven printed no error markers.
fn build_excerpt(output: &str) -> String {
    excerpt(output, |line| line.contains("[ERROR]"), 2, 2, 50)
}

/// Excerpt a failed test log: result lines and failure markers with
/// context, or the last 30 lines when no markers were found.
fn test_excerpt(output: &str) -> String {
    excerpt(
        output,
        |line| {
            line.contains("Tests run:")
                || line.contains("<<< FAILURE!")
                || line.contains("<<< ERROR!")
                || line.contains("BUILD FAILURE")
                || line.contains("Failed to execute goal")
                || line.contains("[ERROR]")
        },
        2,
        5,
        30,
    )
}

fn excerpt(
    output: &str,
    relevant: impl Fn(&str) -> bool,
    before: usize,
    after: usize,
    fallback_tail: usize,
) -> String {
    let lines: Vec<&str> = output.lines().collect();

    let mut include = vec![false; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        if relevant(line) {
            let start = i.saturating_sub(before);
            let end = (i + after).min(lines.len().saturating_sub(1));
            for slot in include.iter_mut().take(end + 1).skip(start) {
                *slot = true;
            }
        }
    }

    let selected: Vec<&str> = lines
        .iter()
        .zip(&include)
        .filter(|(_, keep)| **keep)
        .map(|(line, _)| *line)
        .take(50)
        .collect();

    if selected.is_empty() {
        let tail = lines.len().saturating_sub(fallback_tail);
        lines[tail..].join("\n")
    } else {
        selected.join("\n")
    }
}
