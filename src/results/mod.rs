//! Results storage and reporting module
//!
//! Local JSON storage plus the remote sinks (Logstash, Popcorn) and JUnit
//! XML for CI. Reporting never changes a run's verdict.

mod junit;
mod logstash;
mod popcorn;
mod storage;

pub use junit::to_junit_xml;
pub use logstash::LogstashUploader;
pub use popcorn::{PopcornReport, PopcornReporter};
pub use storage::{generate_run_id, EnvironmentInfo, ResultsStorage, RunInfo, StoredRun};

use anyhow::Result;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{info, warn};

use crate::config::ReportingConfig;
use crate::models::RunSummary;

/// Outcome of one remote upload
#[derive(Debug)]
pub struct SinkOutcome {
    pub sink: &'static str,
    pub result: Result<()>,
}

/// Upload `summary` to every configured sink concurrently.
///
/// Failures are logged and returned; they never affect the exit code.
pub async fn publish(
    summary: &RunSummary,
    run_id: &str,
    reporting: &ReportingConfig,
    timeout_secs: u64,
) -> Vec<SinkOutcome> {
    let mut uploads: Vec<(&'static str, BoxFuture<'_, Result<()>>)> = Vec::new();

    if let Some(url) = &reporting.logstash_url {
        uploads.push((
            "logstash",
            async move {
                LogstashUploader::new(url.clone(), timeout_secs)?
                    .upload(summary, run_id)
                    .await
                    .map(|_| ())
            }
            .boxed(),
        ));
    }

    if let Some(url) = &reporting.popcorn_url {
        uploads.push((
            "popcorn",
            async move {
                PopcornReporter::new(url.clone(), timeout_secs)?
                    .report(summary, run_id)
                    .await
            }
            .boxed(),
        ));
    }

    if uploads.is_empty() {
        info!("No result sinks configured; skipping upload");
        return Vec::new();
    }

    let (sinks, futures): (Vec<_>, Vec<_>) = uploads.into_iter().unzip();
    let results = join_all(futures).await;

    sinks
        .into_iter()
        .zip(results)
        .map(|(sink, result)| {
            if let Err(e) = &result {
                warn!("Upload to {} failed: {:#}", sink, e);
            }
            SinkOutcome { sink, result }
        })
        .collect()
}
