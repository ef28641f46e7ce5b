//! The `analyze` command: the full triage pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::analyze::{FailureAnalyzer, ResolverOptions, UpstreamChangeResolver};
use crate::config::AppConfig;
use crate::find;
use crate::fs::JsonHistoryStore;
use crate::git::GitCommitRange;
use crate::project::ProjectSource;
use crate::report::ReportBuilder;
use crate::run::MavenRunner;

/// Branch the upstream and suite repositories are tracked on.
const DEFAULT_BRANCH: &str = "main";

pub fn execute(config: AppConfig, source: ProjectSource) -> Result<()> {
    check_prerequisites()?;

    let project = source.resolve()?;
    let failures = find::find_failures(project.path())?;

    if !failures.is_empty() {
        println!(
            "Found {} test failure(s), analyzing root causes...",
            failures.len()
        );
    }

    let workspace = config
        .workspace_dir
        .clone()
        .unwrap_or_else(default_workspace);
    let upstream_path = workspace.join("upstream");
    let suite_path = workspace.join("suite");

    let upstream = GitCommitRange::remote(&config.upstream_repo_url, &upstream_path, DEFAULT_BRANCH);
    let suite = GitCommitRange::remote(&config.test_suite_repo_url, &suite_path, DEFAULT_BRANCH);
    let runner = MavenRunner::new(upstream_path, suite_path, workspace.join("logs"))
        .with_timeout(config.command_timeout)
        .with_native_builder_image(config.native_builder_image.clone());
    let store = JsonHistoryStore::new(&config.history_file);

    let mut resolver = UpstreamChangeResolver::new(
        ResolverOptions {
            lookback_days: config.lookback_days,
            from: config.from,
            bisect_strategy: config.bisect_strategy,
        },
        Box::new(upstream),
        Box::new(suite),
        Box::new(runner),
        Box::new(store),
    );

    let mut builder = ReportBuilder::new(source.describe());
    {
        let mut analyzer = FailureAnalyzer::new(&mut resolver);
        for failure in &failures {
            let cause = analyzer
                .analyze(failure)
                .with_context(|| format!("Failed to analyze {failure}"))?;
            builder.add_root_cause(&cause);
        }
    }

    resolver
        .finalize()
        .context("Failed to finalize failure history")?;

    let report = builder.build();
    report.write(config.output_file.as_deref())?;
    Ok(())
}

fn default_workspace() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("culprit")
}

fn check_prerequisites() -> Result<()> {
    which::which("git").context("`git` is required but was not found on PATH")?;
    if which::which("mvn").is_err() {
        // only needed once a bisection actually runs
        tracing::warn!("`mvn` not found on PATH, bisection of new failures will fail");
    }
    Ok(())
}
