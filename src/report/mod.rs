//! Report assembly and rendering.
//!
//! Collects the final snapshot of every root cause and renders a plain
//! text report, written to stdout and optionally to a file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::failure::simple_name;
use crate::models::{FailureReason, RootCause, UpstreamChange};

const MAX_MESSAGE_LEN: usize = 100;

/// Accumulates root causes for one run. Causes are keyed by identifier;
/// a later snapshot of the same cause supersedes the earlier one, so the
/// report always shows the complete failure list.
pub struct ReportBuilder {
    root_causes: Vec<RootCause>,
    analyzed_source: String,
}

impl ReportBuilder {
    pub fn new(analyzed_source: impl Into<String>) -> Self {
        Self {
            root_causes: Vec::new(),
            analyzed_source: analyzed_source.into(),
        }
    }

    pub fn add_root_cause(&mut self, cause: &RootCause) {
        match self
            .root_causes
            .iter_mut()
            .find(|existing| existing.identifier == cause.identifier)
        {
            Some(existing) => *existing = cause.clone(),
            None => self.root_causes.push(cause.clone()),
        }
    }

    pub fn build(self) -> Report {
        Report {
            text: render(&self.root_causes, &self.analyzed_source),
        }
    }
}

/// A rendered report.
pub struct Report {
    text: String,
}

impl Report {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Print to stdout and, when configured, save to `output_file`.
    pub fn write(&self, output_file: Option<&Path>) -> Result<()> {
        println!("{}", self.text);

        if let Some(path) = output_file {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            fs::write(path, &self.text)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report saved");
        }
        Ok(())
    }
}

fn render(root_causes: &[RootCause], analyzed_source: &str) -> String {
    let mut out = String::new();

    if root_causes.is_empty() {
        out.push_str("✓ No test failures detected.\n");
        out.push_str(&format!("\nAnalyzed: {analyzed_source}\n"));
        return out;
    }

    out.push_str("=== Test Failure Analysis Report ===\n");
    out.push_str(&format!("Analyzed: {analyzed_source}\n"));
    out.push_str(&format!(
        "Found {} distinct root cause(s):\n\n",
        root_causes.len()
    ));

    for (index, cause) in root_causes.iter().enumerate() {
        render_root_cause(&mut out, index + 1, cause);
    }

    out.push_str("=== End of Report ===\n");
    out
}

fn render_root_cause(out: &mut String, index: usize, cause: &RootCause) {
    let primary_count = cause.failures.len() - cause.metadata.deduped_failures as usize;
    out.push_str(&format!(
        "Root Cause #{index} [{} confidence]\n",
        cause.confidence
    ));
    out.push_str(&format!("  Identifier: {}\n", cause.identifier));
    out.push_str(&format!("  Module: {}\n", cause.module_path.display()));
    out.push_str(&format!("  Summary: {}\n", cause.summary));
    out.push_str(&format!(
        "  Failures: {} ({} primary + {} deduplicated)\n",
        cause.failures.len(),
        primary_count,
        cause.metadata.deduped_failures
    ));

    out.push_str("  Affected tests:\n");
    for failure in &cause.failures {
        let marker = if failure.primary { "[PRIMARY]" } else { "[DEDUPED]" };
        out.push_str(&format!(
            "    {marker} {}.{}\n",
            simple_name(&failure.test_class_name),
            failure.test_method_name
        ));
        if let Some(message) = failure.failure_message.as_deref() {
            if !message.trim().is_empty() {
                out.push_str(&format!("      └─ {}\n", truncate_message(message)));
            }
        }
    }

    render_upstream_change(out, cause.upstream_change.as_ref());
    out.push('\n');
}

fn render_upstream_change(out: &mut String, change: Option<&UpstreamChange>) {
    let Some(change) = change else {
        out.push_str("  Upstream change: no information\n");
        return;
    };

    match change.reason {
        FailureReason::Found => {
            let commit = change.commit.as_deref().unwrap_or("<unknown>");
            match &change.pull_request {
                Some(pr) => out.push_str(&format!(
                    "  Upstream change: commit {commit} (PR #{pr})\n"
                )),
                None => out.push_str(&format!("  Upstream change: commit {commit}\n")),
            }
            if let Some(message) = change.commit_message.as_deref() {
                if let Some(first_line) = message.lines().next() {
                    out.push_str(&format!("      └─ {first_line}\n"));
                }
            }
        }
        FailureReason::CannotReproduce => out.push_str(
            "  Upstream change: could not reproduce on any tested commit, \
             likely flaky or environment-dependent\n",
        ),
        FailureReason::OldestCommitFailed => out.push_str(
            "  Upstream change: failure predates the search window, \
             consider increasing the lookback period\n",
        ),
        FailureReason::BuildFailed => out.push_str(
            "  Upstream change: bisection blocked by broken upstream builds\n",
        ),
    }
}

fn truncate_message(message: &str) -> String {
    let single_line = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= MAX_MESSAGE_LEN {
        return single_line;
    }
    let truncated: String = single_line.chars().take(MAX_MESSAGE_LEN - 3).collect();
    format!("{truncated}...")
}
