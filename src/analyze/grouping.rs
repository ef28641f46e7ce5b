//! Root-cause grouping engine.
//!
//! Deduplicates individual test failures into root causes. Two lookup
//! tables, by test class and by module path, hold the current snapshot of
//! each group; class identity is checked before module identity, so two
//! unrelated failing classes in one module are not merged on first sight.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::analyze::UpstreamChangeFinder;
use crate::models::{Confidence, Failure, FailureDetails, GroupingStrategy, RootCause};

/// Stateful grouping session for one run.
pub struct FailureAnalyzer<'a> {
    finder: &'a mut dyn UpstreamChangeFinder,
    by_class: HashMap<String, RootCause>,
    by_module: HashMap<PathBuf, RootCause>,
}

impl<'a> FailureAnalyzer<'a> {
    pub fn new(finder: &'a mut dyn UpstreamChangeFinder) -> Self {
        Self {
            finder,
            by_class: HashMap::new(),
            by_module: HashMap::new(),
        }
    }

    /// Map a failure to its root cause, creating a new group when neither
    /// its class nor its module is tracked yet. The upstream change is
    /// resolved once, when the group is created.
    pub fn analyze(&mut self, failure: &Failure) -> Result<RootCause> {
        tracing::info!(failure = %failure, "Analyzing test failure");

        if self.by_class.contains_key(&failure.test_class_name) {
            return Ok(self.append_by_class(failure));
        }

        if self.by_module.contains_key(&failure.module_path) {
            return Ok(self.append_by_module(failure));
        }

        self.create_root_cause(failure)
    }

    /// Root causes created this session, in no particular order.
    pub fn root_causes(&self) -> impl Iterator<Item = &RootCause> {
        self.by_class.values()
    }

    fn append_by_class(&mut self, failure: &Failure) -> RootCause {
        let existing = &self.by_class[&failure.test_class_name];
        let updated = existing.with_failure(FailureDetails::from_failure(failure, false));

        self.by_class
            .insert(failure.test_class_name.clone(), updated.clone());
        // keep the module table pointing at the same snapshot
        self.by_module
            .insert(failure.module_path.clone(), updated.clone());

        tracing::info!(
            identifier = %updated.identifier,
            failures = updated.failures.len(),
            "Added failure to existing root cause"
        );
        updated
    }

    fn append_by_module(&mut self, failure: &Failure) -> RootCause {
        let existing = &self.by_module[&failure.module_path];
        let primary_class = existing.primary().test_class_name.clone();
        let updated = existing.with_failure(FailureDetails::from_failure(failure, false));

        self.by_module
            .insert(failure.module_path.clone(), updated.clone());
        // the class table is keyed by the primary failure's class
        self.by_class.insert(primary_class, updated.clone());

        tracing::info!(
            identifier = %updated.identifier,
            failures = updated.failures.len(),
            "Added failure to existing root cause"
        );
        updated
    }

    fn create_root_cause(&mut self, failure: &Failure) -> Result<RootCause> {
        // First occurrence: the failure itself is the best evidence we
        // have, so the grouping is high confidence and keyed by class.
        let identifier = format!("CLASS:{}", failure.test_class_name);
        let summary = format!(
            "Test failure in {} - {}",
            failure.simple_class_name(),
            failure.simple_throwable_name()
        );

        let upstream_change = self.finder.find_upstream_change(failure)?;

        let cause = RootCause::from_primary(
            identifier,
            summary,
            Confidence::High,
            failure,
            GroupingStrategy::ByClass,
            upstream_change,
        );

        self.by_class
            .insert(failure.test_class_name.clone(), cause.clone());
        self.by_module
            .insert(failure.module_path.clone(), cause.clone());

        tracing::info!(identifier = %cause.identifier, "Created new root cause");
        Ok(cause)
    }
}
