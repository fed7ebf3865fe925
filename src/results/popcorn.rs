//! Popcorn test-management reporting

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::clients::RestClient;
use crate::models::{RunSummary, TestStatus};

/// Run-level record expected by the Popcorn results API
#[derive(Clone, Debug, Serialize)]
pub struct PopcornReport {
    pub run_id: String,
    pub test_name: String,
    pub suite: String,
    pub jira_id: String,
    pub priority: String,
    pub product: String,
    pub firmware_version: Option<String>,
    pub uut_ip: String,
    pub result: TestStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub duration_ms: u64,
    /// First non-passing message, if any
    pub error_message: Option<String>,
}

impl PopcornReport {
    pub fn from_summary(summary: &RunSummary, run_id: &str) -> Self {
        let error_message = summary
            .results
            .iter()
            .filter(|r| r.status.is_failure())
            .find_map(|r| r.message.clone());

        Self {
            run_id: run_id.to_string(),
            test_name: summary.meta.name.clone(),
            suite: summary.meta.suite.clone(),
            jira_id: summary.meta.jira_id.clone(),
            priority: summary.meta.priority.to_string(),
            product: summary.product.name().to_string(),
            firmware_version: summary.firmware_version.clone(),
            uut_ip: summary.uut_ip.clone(),
            result: summary.overall_status(),
            total: summary.total,
            passed: summary.passed,
            failed: summary.failed,
            skipped: summary.skipped,
            errors: summary.errors,
            duration_ms: summary.total_duration_ms,
            error_message,
        }
    }
}

pub struct PopcornReporter {
    client: RestClient,
    url: String,
}

impl PopcornReporter {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: RestClient::with_timeout(timeout_secs)?,
            url: url.into(),
        })
    }

    pub async fn report(&self, summary: &RunSummary, run_id: &str) -> Result<()> {
        let report = PopcornReport::from_summary(summary, run_id);
        let body = serde_json::to_value(&report).context("Failed to encode Popcorn report")?;

        self.client
            .post_json(&self.url, &body)
            .await
            .with_context(|| format!("Popcorn report to {} failed", self.url))?;

        info!("Reported {} ({}) to Popcorn", report.test_name, report.result);
        Ok(())
    }
}
