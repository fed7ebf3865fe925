//! Test result models
//!
//! Defines test metadata, per-iteration results and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProductLine;

/// Test-management priority
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::P3 => write!(f, "P3"),
            Priority::P4 => write!(f, "P4"),
        }
    }
}

/// Declared metadata of a test case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeta {
    pub name: String,
    pub suite: String,
    pub jira_id: String,
    pub priority: Priority,
    /// Empty means every product line
    pub products: Vec<ProductLine>,
    pub description: String,
}

impl TestMeta {
    pub fn new(name: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: suite.into(),
            jira_id: String::new(),
            priority: Priority::P2,
            products: Vec::new(),
            description: String::new(),
        }
    }

    pub fn jira(mut self, jira_id: impl Into<String>) -> Self {
        self.jira_id = jira_id.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn product(mut self, product: ProductLine) -> Self {
        self.products.push(product);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn supports(&self, product: ProductLine) -> bool {
        self.products.is_empty() || self.products.contains(&product)
    }
}

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
            TestStatus::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }

    /// Fail and Error break the run; Skip does not
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one iteration of a test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub iteration: u32,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl TestResult {
    fn with_status(test_name: impl Into<String>, iteration: u32, status: TestStatus) -> Self {
        Self {
            test_name: test_name.into(),
            iteration,
            status,
            started_at: Utc::now(),
            duration_ms: 0,
            message: None,
        }
    }

    pub fn pass(test_name: impl Into<String>, iteration: u32, duration_ms: u64) -> Self {
        Self::with_status(test_name, iteration, TestStatus::Pass).with_duration(duration_ms)
    }

    pub fn fail(
        test_name: impl Into<String>,
        iteration: u32,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::with_status(test_name, iteration, TestStatus::Fail)
            .with_duration(duration_ms)
            .with_message(message)
    }

    pub fn skip(test_name: impl Into<String>, iteration: u32, reason: impl Into<String>) -> Self {
        Self::with_status(test_name, iteration, TestStatus::Skip).with_message(reason)
    }

    pub fn error(test_name: impl Into<String>, iteration: u32, error: impl Into<String>) -> Self {
        Self::with_status(test_name, iteration, TestStatus::Error).with_message(error)
    }

    pub fn with_status_of(
        test_name: impl Into<String>,
        iteration: u32,
        status: TestStatus,
        message: Option<String>,
    ) -> Self {
        let mut result = Self::with_status(test_name, iteration, status);
        result.message = message;
        result
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} #{} [{}ms]",
            self.status.symbol(),
            self.test_name,
            self.iteration,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of every iteration of one test case run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub meta: TestMeta,
    pub uut_ip: String,
    pub product: ProductLine,
    pub firmware_version: Option<String>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn new(
        meta: TestMeta,
        uut_ip: impl Into<String>,
        product: ProductLine,
        results: Vec<TestResult>,
    ) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();

        Self {
            total: results.len(),
            passed: count(TestStatus::Pass),
            failed: count(TestStatus::Fail),
            skipped: count(TestStatus::Skip),
            errors: count(TestStatus::Error),
            total_duration_ms: results.iter().map(|r| r.duration_ms).sum(),
            meta,
            uut_ip: uut_ip.into(),
            product,
            firmware_version: None,
            results,
        }
    }

    pub fn with_firmware(mut self, version: Option<String>) -> Self {
        self.firmware_version = version;
        self
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// Worst status across iterations: Error > Fail > Pass > Skip
    pub fn overall_status(&self) -> TestStatus {
        if self.errors > 0 {
            TestStatus::Error
        } else if self.failed > 0 {
            TestStatus::Fail
        } else if self.passed > 0 {
            TestStatus::Pass
        } else {
            TestStatus::Skip
        }
    }

    /// Process exit code: 0 on pass, 1 on failure
    pub fn exit_code(&self) -> u8 {
        if self.overall_status().is_failure() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}] on {} ({})", self.meta.name, self.meta.jira_id, self.uut_ip, self.product)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TestMeta {
        TestMeta::new("app_install", "BAT")
            .jira("KAM-1234")
            .product(ProductLine::Kamino)
    }

    #[test]
    fn test_meta_supports() {
        assert!(meta().supports(ProductLine::Kamino));
        assert!(!meta().supports(ProductLine::Kdp));
        assert!(TestMeta::new("any", "BAT").supports(ProductLine::Kdp));
    }

    #[test]
    fn test_result_creation() {
        let result = TestResult::pass("app_install", 1, 100);
        assert!(result.status.is_success());
        assert_eq!(result.duration_ms, 100);
        assert!(result.message.is_none());
    }

    #[test]
    fn test_run_summary() {
        let results = vec![
            TestResult::pass("app_install", 1, 100),
            TestResult::fail("app_install", 2, 50, "app not listed"),
            TestResult::skip("app_install", 3, "device offline"),
        ];

        let summary = RunSummary::new(meta(), "10.0.0.5", ProductLine::Kamino, results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_duration_ms, 150);
        assert_eq!(summary.overall_status(), TestStatus::Fail);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_overall_status_precedence() {
        let results = vec![
            TestResult::fail("t", 1, 10, "bad"),
            TestResult::error("t", 2, "adb offline"),
        ];
        let summary = RunSummary::new(meta(), "10.0.0.5", ProductLine::Kamino, results);
        assert_eq!(summary.overall_status(), TestStatus::Error);

        let skipped = RunSummary::new(
            meta(),
            "10.0.0.5",
            ProductLine::Kamino,
            vec![TestResult::skip("t", 1, "n/a")],
        );
        assert_eq!(skipped.overall_status(), TestStatus::Skip);
        assert_eq!(skipped.exit_code(), 0);
    }
}
