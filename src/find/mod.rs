//! Failure discovery.
//!
//! Walks a tested project directory for failsafe summaries and turns the
//! reports of failing modules into [`Failure`] records.

pub mod failsafe;

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Failure;

/// Find every test failure reported under `project_dir`.
pub fn find_failures(project_dir: &Path) -> Result<Vec<Failure>> {
    tracing::info!(dir = %project_dir.display(), "Looking for test failures");

    let pattern = format!("{}/**/failsafe-summary.xml", project_dir.display());
    let mut failures = Vec::new();

    for entry in glob::glob(&pattern).context("Invalid report search pattern")? {
        let summary = entry.context("Failed to walk project directory")?;
        let (errors, failure_count) = match failsafe::summary_counts(&summary) {
            Ok(counts) => counts,
            Err(err) => {
                tracing::warn!(summary = %summary.display(), error = %err, "Skipping unreadable summary");
                continue;
            }
        };

        if errors == 0 && failure_count == 0 {
            tracing::debug!(summary = %summary.display(), "Summary reports no failures");
            continue;
        }

        tracing::info!(
            summary = %summary.display(),
            errors,
            failures = failure_count,
            "Found failing module"
        );
        let reports_dir = summary
            .parent()
            .context("Summary file has no parent directory")?;
        failures.extend(failsafe::parse_reports_dir(reports_dir)?);
    }

    tracing::info!(count = failures.len(), "Collected test failures");
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const FAILING_SUMMARY: &str = r#"<failsafe-summary result="255">
    <errors>0</errors>
    <failures>1</failures>
</failsafe-summary>"#;

    const CLEAN_SUMMARY: &str = r#"<failsafe-summary result="0">
    <errors>0</errors>
    <failures>0</failures>
</failsafe-summary>"#;

    const REPORT: &str = r#"<testsuite name="org.acme.FooIT">
  <testcase classname="org.acme.FooIT" name="testFails">
    <failure message="boom" type="java.lang.AssertionError">trace</failure>
  </testcase>
</testsuite>"#;

    fn write_module(root: &Path, name: &str, summary: &str, with_report: bool) {
        let reports = root.join(name).join("target/failsafe-reports");
        fs::create_dir_all(&reports).unwrap();
        fs::write(root.join(name).join("pom.xml"), "<project/>").unwrap();
        fs::write(reports.join("failsafe-summary.xml"), summary).unwrap();
        if with_report {
            fs::write(reports.join("TEST-org.acme.FooIT.xml"), REPORT).unwrap();
        }
    }

    #[test]
    fn test_only_failing_modules_contribute() {
        let temp = TempDir::new().unwrap();
        write_module(temp.path(), "failing", FAILING_SUMMARY, true);
        write_module(temp.path(), "clean", CLEAN_SUMMARY, true);

        let failures = find_failures(temp.path()).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].test_class_name, "org.acme.FooIT");
        assert!(failures[0]
            .module_path
            .ends_with("failing"));
    }

    #[test]
    fn test_empty_project_has_no_failures() {
        let temp = TempDir::new().unwrap();
        let failures = find_failures(temp.path()).unwrap();
        assert!(failures.is_empty());
    }
}
