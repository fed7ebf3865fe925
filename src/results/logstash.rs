//! Logstash upload
//!
//! Each iteration becomes one flat JSON document posted to the Logstash
//! HTTP input, so dashboards can chart pass rates per build.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::clients::RestClient;
use crate::models::RunSummary;

pub struct LogstashUploader {
    client: RestClient,
    url: String,
}

impl LogstashUploader {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: RestClient::with_timeout(timeout_secs)?,
            url: url.into(),
        })
    }

    /// Documents for every iteration of the run
    pub fn documents(summary: &RunSummary, run_id: &str) -> Vec<Value> {
        summary
            .results
            .iter()
            .map(|result| {
                json!({
                    "@timestamp": result.started_at.to_rfc3339(),
                    "run_id": run_id,
                    "testName": result.test_name,
                    "suite": summary.meta.suite,
                    "jira_id": summary.meta.jira_id,
                    "priority": summary.meta.priority.to_string(),
                    "iteration": result.iteration,
                    "status": result.status.to_string(),
                    "duration_ms": result.duration_ms,
                    "message": result.message,
                    "product": summary.product.name(),
                    "firmware_version": summary.firmware_version,
                    "uut_ip": summary.uut_ip,
                })
            })
            .collect()
    }

    pub async fn upload(&self, summary: &RunSummary, run_id: &str) -> Result<usize> {
        let documents = Self::documents(summary, run_id);
        for doc in &documents {
            debug!("Posting iteration {} to Logstash", doc["iteration"]);
            self.client
                .post_json(&self.url, doc)
                .await
                .with_context(|| format!("Logstash upload to {} failed", self.url))?;
        }

        info!("Uploaded {} document(s) to Logstash", documents.len());
        Ok(documents.len())
    }
}
