//! Results storage and retrieval
//!
//! One pretty-printed JSON file per run, grouped in a directory per test.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{RunSummary, TestStatus};

/// Stored run of one test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub summary: RunSummary,

    pub environment: EnvironmentInfo,
}

/// Host the run was driven from
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    pub fn new(summary: RunSummary) -> Self {
        let completed_at = Utc::now();
        let started_at = summary
            .results
            .iter()
            .map(|r| r.started_at)
            .min()
            .unwrap_or(completed_at);

        Self {
            id: generate_run_id(),
            started_at,
            completed_at,
            summary,
            environment: EnvironmentInfo::default(),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.summary.meta.name
    }
}

/// Generate unique run ID
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub test_name: String,
    pub started_at: DateTime<Utc>,
    pub iterations: usize,
    pub status: TestStatus,
    pub pass_rate: f64,
}

/// Results storage manager
pub struct ResultsStorage {
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn test_dir(&self, test_name: &str) -> PathBuf {
        self.base_dir.join(test_name.to_lowercase())
    }

    fn run_path(&self, test_name: &str, run_id: &str) -> PathBuf {
        self.test_dir(test_name).join(format!("{run_id}.json"))
    }

    /// Save a run
    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        let test_dir = self.test_dir(run.test_name());
        fs::create_dir_all(&test_dir)
            .with_context(|| format!("Failed to create {}", test_dir.display()))?;

        let path = self.run_path(run.test_name(), &run.id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved test results to {}", path.display());
        Ok(path)
    }

    /// Load a run
    pub fn load(&self, test_name: &str, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(test_name, run_id);
        let run = self
            .load_from_path(&path)
            .with_context(|| format!("No run {run_id} for {test_name}"))?;
        debug!("Loaded test results from {}", path.display());
        Ok(run)
    }

    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// Tests that have stored results
    pub fn list_tests(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut tests = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    tests.push(name.to_string());
                }
            }
        }

        tests.sort();
        Ok(tests)
    }

    /// All runs of a test, newest first
    pub fn load_test(&self, test_name: &str) -> Result<Vec<StoredRun>> {
        let test_dir = self.test_dir(test_name);
        if !test_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&test_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => debug!("Failed to load {}: {}", path.display(), e),
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    pub fn list_runs(&self, test_name: &str) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_test(test_name)?
            .into_iter()
            .map(|run| RunInfo {
                status: run.summary.overall_status(),
                pass_rate: run.summary.pass_rate(),
                iterations: run.summary.total,
                test_name: run.summary.meta.name,
                started_at: run.started_at,
                id: run.id,
            })
            .collect())
    }

    pub fn latest(&self, test_name: &str) -> Result<Option<StoredRun>> {
        Ok(self.load_test(test_name)?.into_iter().next())
    }

    /// Write one CSV row per iteration
    pub fn export_csv(&self, run: &StoredRun, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        writer.write_record([
            "run_id",
            "test_name",
            "jira_id",
            "iteration",
            "status",
            "started_at",
            "duration_ms",
            "message",
        ])?;

        for result in &run.summary.results {
            writer.write_record([
                run.id.clone(),
                result.test_name.clone(),
                run.summary.meta.jira_id.clone(),
                result.iteration.to_string(),
                result.status.to_string(),
                result.started_at.to_rfc3339(),
                result.duration_ms.to_string(),
                result.message.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductLine, TestMeta, TestResult};
    use tempfile::tempdir;

    fn summary() -> RunSummary {
        RunSummary::new(
            TestMeta::new("raid_health", "storage").jira("GZA-101"),
            "10.0.0.5",
            ProductLine::Godzilla,
            vec![
                TestResult::pass("raid_health", 1, 120),
                TestResult::fail("raid_health", 2, 80, "md1 degraded, \"sdb\" missing"),
            ],
        )
    }

    #[test]
    fn test_run_id_format() {
        let id = generate_run_id();
        assert_eq!(id.len(), "20260101_120000_0000".len());
        assert_eq!(&id[8..9], "_");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = StoredRun::new(summary());

        let path = storage.save(&run).unwrap();
        assert!(path.starts_with(dir.path().join("raid_health")));

        let loaded = storage.load("raid_health", &run.id).unwrap();
        assert_eq!(loaded.summary.total, 2);
        assert_eq!(loaded.summary.failed, 1);
        assert!(storage.load("raid_health", "nope").is_err());
    }

    #[test]
    fn test_list_tests_and_runs() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        assert!(storage.list_tests().unwrap().is_empty());

        storage.save(&StoredRun::new(summary())).unwrap();

        assert_eq!(storage.list_tests().unwrap(), vec!["raid_health"]);
        let runs = storage.list_runs("raid_health").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, TestStatus::Fail);
        assert_eq!(runs[0].iterations, 2);
        assert!(storage.list_runs("unknown").unwrap().is_empty());
    }

    #[test]
    fn test_export_csv() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = StoredRun::new(summary());
        let path = dir.path().join("out.csv");

        storage.export_csv(&run, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][4], "FAIL");
        assert_eq!(&rows[1][7], "md1 degraded, \"sdb\" missing");
    }
}
