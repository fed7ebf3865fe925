//! Output formatters for test results
//!
//! Table, JSON, CSV and one-line summary renderings of iteration results
//! and run summaries.

use std::io::Write;

use crate::models::{RunSummary, TestMeta, TestResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single iteration result
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => format_result_csv(result),
            OutputFormat::Summary => format_result_summary(result),
        }
    }

    fn status_label(&self, status: TestStatus) -> &'static str {
        match (status, self.colorize) {
            (TestStatus::Pass, true) => "\x1b[32m✓ PASS\x1b[0m",
            (TestStatus::Fail, true) => "\x1b[31m✗ FAIL\x1b[0m",
            (TestStatus::Skip, true) => "\x1b[33m○ SKIP\x1b[0m",
            (TestStatus::Error, true) => "\x1b[31m! ERROR\x1b[0m",
            (TestStatus::Pass, false) => "✓ PASS",
            (TestStatus::Fail, false) => "✗ FAIL",
            (TestStatus::Skip, false) => "○ SKIP",
            (TestStatus::Error, false) => "! ERROR",
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let mut line = format!(
            "#{:<3} {:28} {} [{:>7}ms]",
            result.iteration,
            result.test_name,
            self.status_label(result.status),
            result.duration_ms
        );
        if !result.status.is_success() {
            if let Some(message) = &result.message {
                line.push_str("  ");
                line.push_str(message);
            }
        }
        line
    }

    /// Format a whole run
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => format_summary_csv(summary),
            OutputFormat::Summary => format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  {:28} {:>10} on {:15} {:>4} ║\n",
            summary.meta.name,
            summary.meta.jira_id,
            summary.uut_ip,
            summary.product.name()
        ));
        if let Some(firmware) = &summary.firmware_version {
            output.push_str(&format!("║  Firmware: {firmware:50} ║\n"));
        }
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&format!("║  {}\n", self.format_result_table(result)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            "║  Total: {:2} | Pass: {} | Fail: {} | Skip: {:2} | Error: {:2}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:8}ms | Result: {}\n",
            summary.pass_rate(),
            summary.total_duration_ms,
            self.status_label(summary.overall_status())
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    /// Format the test catalogue for `list`
    pub fn format_catalogue(&self, tests: &[TestMeta], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(tests).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(tests).unwrap_or_default(),
            _ => {
                let mut output = String::new();
                for meta in tests {
                    let products = if meta.products.is_empty() {
                        "all".to_string()
                    } else {
                        meta.products
                            .iter()
                            .map(|p| p.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    output.push_str(&format!(
                        "{:28} {:10} {} [{}]\n",
                        meta.name, meta.jira_id, meta.priority, products
                    ));
                    if detailed && !meta.description.is_empty() {
                        output.push_str(&format!("    {}\n", meta.description));
                    }
                }
                output
            }
        }
    }
}

fn format_result_csv(result: &TestResult) -> String {
    format!(
        "{},{},{},{},\"{}\"",
        result.iteration,
        result.test_name,
        result.status,
        result.duration_ms,
        result.message.as_deref().unwrap_or("").replace('"', "\"\"")
    )
}

fn format_result_summary(result: &TestResult) -> String {
    format!(
        "{} {} #{} ({}ms)",
        result.status.symbol(),
        result.test_name,
        result.iteration,
        result.duration_ms
    )
}

fn format_summary_csv(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str("iteration,test_name,status,duration_ms,message\n");
    for result in &summary.results {
        output.push_str(&format_result_csv(result));
        output.push('\n');
    }
    output
}

fn format_summary_brief(summary: &RunSummary) -> String {
    format!(
        "{} on {} ({}): {} - {}/{} passed ({:.1}%) in {}ms",
        summary.meta.name,
        summary.uut_ip,
        summary.product,
        summary.overall_status(),
        summary.passed,
        summary.total,
        summary.pass_rate(),
        summary.total_duration_ms
    )
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run summary to a file
pub fn write_summary_to_file(
    path: &std::path::Path,
    summary: &RunSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
