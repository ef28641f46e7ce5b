use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Whether a test reported an assertion failure or an unexpected error.
///
/// Mirrors the two JUnit report elements (`<failure>` vs `<error>`); the
/// distinction matters for the report, not for grouping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// An assertion failed
    Failure,
    /// The test threw an unexpected exception
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Failure => write!(f, "failure"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// A single test failure as found in a CI test report.
///
/// Immutable once produced by the finder; everything downstream
/// (grouping, bisection, history) works on snapshots of this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Failure {
    /// Fully qualified test class name
    pub test_class_name: String,
    /// Test method name
    pub test_method_name: String,
    /// Absolute path of the build module containing the test (the
    /// directory holding its `pom.xml`)
    pub module_path: PathBuf,
    /// Message from the failure/error element, if any
    pub failure_message: Option<String>,
    /// Assertion failure vs unexpected error
    pub kind: FailureKind,
    /// Fully qualified name of the thrown type, if reported
    pub throwable_class: Option<String>,
    /// Raw log captured for the failing test
    pub test_run_log: String,
}

impl Failure {
    /// The unqualified class name, e.g. `HttpTest` for `org.acme.HttpTest`.
    pub fn simple_class_name(&self) -> &str {
        simple_name(&self.test_class_name)
    }

    /// The unqualified thrown-type name, or "Unknown" when not reported.
    pub fn simple_throwable_name(&self) -> &str {
        self.throwable_class
            .as_deref()
            .map(simple_name)
            .unwrap_or("Unknown")
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// `Class#method`, the key used for history lookups.
    pub fn test_id(&self) -> String {
        format!("{}#{}", self.test_class_name, self.test_method_name)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({}) in {}",
            self.test_class_name,
            self.test_method_name,
            self.kind,
            self.module_path.display()
        )
    }
}

/// Strip the package prefix from a fully qualified name.
pub fn simple_name(fully_qualified: &str) -> &str {
    match fully_qualified.rsplit_once('.') {
        Some((_, simple)) => simple,
        None => fully_qualified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Failure {
        Failure {
            test_class_name: "org.acme.HttpTest".to_string(),
            test_method_name: "testEndpoint".to_string(),
            module_path: PathBuf::from("/work/suite/http/minimal"),
            failure_message: Some("expected 200 but was 500".to_string()),
            kind: FailureKind::Failure,
            throwable_class: Some("java.lang.AssertionError".to_string()),
            test_run_log: String::new(),
        }
    }

    #[test]
    fn test_simple_names() {
        let failure = sample();
        assert_eq!(failure.simple_class_name(), "HttpTest");
        assert_eq!(failure.simple_throwable_name(), "AssertionError");
    }

    #[test]
    fn test_simple_name_without_package() {
        assert_eq!(simple_name("HttpTest"), "HttpTest");
    }

    #[test]
    fn test_test_id() {
        assert_eq!(sample().test_id(), "org.acme.HttpTest#testEndpoint");
    }
}
