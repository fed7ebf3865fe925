//! JUnit XML rendering for CI dashboards

use std::fmt::{self, Write};

use crate::models::{RunSummary, TestStatus};

/// One `<testsuite>` with a `<testcase>` per iteration
pub fn to_junit_xml(summary: &RunSummary) -> String {
    let mut output = String::new();
    // Writing into a String never fails
    let _ = write_junit(&mut output, summary);
    output
}

pub fn write_junit<W: Write>(out: &mut W, summary: &RunSummary) -> fmt::Result {
    let suite = if summary.meta.suite.is_empty() {
        summary.meta.name.as_str()
    } else {
        summary.meta.suite.as_str()
    };

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<testsuite name="{}" tests="{}" failures="{}" errors="{}" skipped="{}" time="{:.3}">"#,
        escape(suite),
        summary.total,
        summary.failed,
        summary.errors,
        summary.skipped,
        seconds(summary.total_duration_ms)
    )?;

    writeln!(out, "  <properties>")?;
    write_property(out, "jira_id", &summary.meta.jira_id)?;
    write_property(out, "product", summary.product.name())?;
    write_property(out, "uut_ip", &summary.uut_ip)?;
    if let Some(firmware) = &summary.firmware_version {
        write_property(out, "firmware_version", firmware)?;
    }
    writeln!(out, "  </properties>")?;

    for result in &summary.results {
        let name = format!("{} #{}", result.test_name, result.iteration);
        let open = format!(
            r#"  <testcase classname="{}" name="{}" time="{:.3}""#,
            escape(suite),
            escape(&name),
            seconds(result.duration_ms)
        );
        let message = escape(result.message.as_deref().unwrap_or_default());

        match result.status {
            TestStatus::Pass => writeln!(out, "{open}/>")?,
            TestStatus::Fail => {
                writeln!(out, "{open}>")?;
                writeln!(out, r#"    <failure message="{message}">{message}</failure>"#)?;
                writeln!(out, "  </testcase>")?;
            }
            TestStatus::Error => {
                writeln!(out, "{open}>")?;
                writeln!(out, r#"    <error message="{message}">{message}</error>"#)?;
                writeln!(out, "  </testcase>")?;
            }
            TestStatus::Skip => {
                writeln!(out, "{open}>")?;
                writeln!(out, r#"    <skipped message="{message}"/>"#)?;
                writeln!(out, "  </testcase>")?;
            }
        }
    }

    writeln!(out, "</testsuite>")
}

fn write_property<W: Write>(out: &mut W, name: &str, value: &str) -> fmt::Result {
    writeln!(
        out,
        r#"    <property name="{}" value="{}"/>"#,
        escape(name),
        escape(value)
    )
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Characters XML 1.0 cannot carry, even as references
fn is_xml_forbidden(c: char) -> bool {
    matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}'
    )
}

/// Escape markup and drop characters XML cannot represent (console output
/// often carries ANSI escapes)
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if is_xml_forbidden(c) => {}
            c => escaped.push(c),
        }
    }
    escaped
}
