//! Failsafe report parsing.
//!
//! Maven's failsafe plugin drops a `failsafe-summary.xml` per module plus
//! one `TEST-<class>.xml` JUnit report per test class. The summary is
//! cheap to read, so only modules whose summary reports errors or
//! failures get their reports parsed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roxmltree::{Document, Node};

use crate::models::{Failure, FailureKind};

const TEST_REPORT_PREFIX: &str = "TEST-";

/// Errors/failures counts from a `failsafe-summary.xml`.
pub fn summary_counts(summary_file: &Path) -> Result<(u32, u32)> {
    let content = fs::read_to_string(summary_file)
        .with_context(|| format!("Failed to read {}", summary_file.display()))?;
    let document = Document::parse(&content)
        .with_context(|| format!("Failed to parse {}", summary_file.display()))?;

    let root = document.root_element();
    let errors = element_u32(root, "errors");
    let failures = element_u32(root, "failures");
    Ok((errors, failures))
}

/// Parse every `TEST-*.xml` report next to a failsafe summary.
pub fn parse_reports_dir(reports_dir: &Path) -> Result<Vec<Failure>> {
    let mut failures = Vec::new();

    let entries = fs::read_dir(reports_dir)
        .with_context(|| format!("Failed to list reports in {}", reports_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if path.is_file() && name.starts_with(TEST_REPORT_PREFIX) && name.ends_with(".xml") {
            match parse_test_report(&path) {
                Ok(mut report_failures) => failures.append(&mut report_failures),
                Err(err) => {
                    tracing::warn!(report = %path.display(), error = %err, "Skipping unparseable report");
                }
            }
        }
    }

    Ok(failures)
}

/// Extract failure records from one JUnit `TEST-*.xml` report.
pub fn parse_test_report(report_file: &Path) -> Result<Vec<Failure>> {
    let content = fs::read_to_string(report_file)
        .with_context(|| format!("Failed to read {}", report_file.display()))?;
    let document = Document::parse(&content)
        .with_context(|| format!("Failed to parse {}", report_file.display()))?;

    let module_path = find_module_path(report_file);
    let mut failures = Vec::new();

    for testcase in document
        .root_element()
        .descendants()
        .filter(|node| node.has_tag_name("testcase"))
    {
        for child in testcase.children().filter(Node::is_element) {
            let kind = match child.tag_name().name() {
                "failure" => FailureKind::Failure,
                "error" => FailureKind::Error,
                _ => continue,
            };
            failures.push(failure_from_elements(&testcase, &child, kind, &module_path));
        }
    }

    Ok(failures)
}

fn failure_from_elements(
    testcase: &Node,
    detail: &Node,
    kind: FailureKind,
    module_path: &Path,
) -> Failure {
    Failure {
        test_class_name: testcase.attribute("classname").unwrap_or_default().to_string(),
        test_method_name: testcase.attribute("name").unwrap_or_default().to_string(),
        module_path: module_path.to_path_buf(),
        failure_message: detail.attribute("message").map(str::to_string),
        kind,
        throwable_class: detail.attribute("type").map(str::to_string),
        test_run_log: detail.text().unwrap_or_default().trim().to_string(),
    }
}

/// The build module owning a report: the nearest ancestor directory with a
/// `pom.xml`, falling back to the report's own directory.
fn find_module_path(report_file: &Path) -> PathBuf {
    let mut current = report_file.parent();
    while let Some(dir) = current {
        if dir.join("pom.xml").exists() {
            return dir.to_path_buf();
        }
        current = dir.parent();
    }
    report_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

fn element_u32(parent: Node, tag: &str) -> u32 {
    parent
        .children()
        .find(|node| node.has_tag_name(tag))
        .and_then(|node| node.text())
        .and_then(|text| text.trim().parse().ok())
        .unwrap_or(0)
}
