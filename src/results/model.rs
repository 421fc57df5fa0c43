// src/results/model.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One line of `go test -json` (test2json) output.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    pub action: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub elapsed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Running,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub name: String,
    pub package: String,
    pub status: TestStatus,
    pub duration: Duration,
    pub output: Vec<String>,
}

impl TestResult {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            status: TestStatus::Running,
            duration: Duration::ZERO,
            output: Vec::new(),
        }
    }

    /// Subtests are reported as `Parent/child`.
    pub fn is_subtest(&self) -> bool {
        self.name.contains('/')
    }
}

/// All results for one package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSuite {
    pub package: String,
    pub tests: Vec<TestResult>,
    pub duration: Duration,
    /// Package-level output not attributed to a single test.
    pub output: Vec<String>,
    /// The package itself failed (build error, panic in init, ...).
    pub package_failed: bool,
}

impl TestSuite {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Self::default()
        }
    }

    pub fn test_mut(&mut self, name: &str) -> &mut TestResult {
        match self.tests.iter().position(|t| t.name == name) {
            Some(i) => &mut self.tests[i],
            None => {
                self.tests.push(TestResult::new(self.package.clone(), name));
                let last = self.tests.len() - 1;
                &mut self.tests[last]
            }
        }
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Failed if anything failed; skipped when only skips were seen;
    /// passed otherwise.
    pub fn status(&self) -> TestStatus {
        if self.package_failed || self.failed() > 0 {
            TestStatus::Failed
        } else if self.skipped() > 0 && self.passed() == 0 {
            TestStatus::Skipped
        } else {
            TestStatus::Passed
        }
    }

    /// Combine several suites into one named `package`.
    pub fn merged<'a, I>(package: impl Into<String>, suites: I) -> Self
    where
        I: IntoIterator<Item = &'a TestSuite>,
    {
        let mut out = TestSuite::new(package);
        for suite in suites {
            out.tests.extend(suite.tests.iter().cloned());
            out.output.extend(suite.output.iter().cloned());
            out.duration += suite.duration;
            out.package_failed |= suite.package_failed;
        }
        out
    }
}

/// Totals over one processed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub suites: usize,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Lines that were not valid test2json events.
    pub unparsed_lines: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: TestStatus) -> TestResult {
        TestResult {
            status,
            ..TestResult::new("pkg", name)
        }
    }

    #[test]
    fn suite_status_rules() {
        let mut suite = TestSuite::new("pkg");
        suite.tests.push(result("TestA", TestStatus::Skipped));
        assert_eq!(suite.status(), TestStatus::Skipped);

        suite.tests.push(result("TestB", TestStatus::Passed));
        assert_eq!(suite.status(), TestStatus::Passed);

        suite.tests.push(result("TestC", TestStatus::Failed));
        assert_eq!(suite.status(), TestStatus::Failed);

        let mut broken = TestSuite::new("pkg");
        broken.package_failed = true;
        assert_eq!(broken.status(), TestStatus::Failed);
    }

    #[test]
    fn parses_test2json_line() {
        let line = r#"{"Time":"2024-01-02T03:04:05.123Z","Action":"pass","Package":"example.com/pkg","Test":"TestA/sub","Elapsed":0.25}"#;
        let event: TestEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.action, "pass");
        assert_eq!(event.test.as_deref(), Some("TestA/sub"));
        assert_eq!(event.elapsed, Some(0.25));
        assert!(event.time.is_some());
    }
}
