//! Validation and repair report artifacts.
//!
//! Each validation run writes `config-validation-<ts>.txt`; each repair cycle
//! writes `config-repair-<ts>.json`. Both land in the configured report
//! directory, which is created on demand.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::repair::RepairCycle;
use crate::validation::ValidationSummary;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Human-readable validation report.
pub fn render_validation(summary: &ValidationSummary, generated: DateTime<Utc>) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = write_validation(&mut out, summary, generated);
    out
}

fn write_validation(
    out: &mut impl Write,
    summary: &ValidationSummary,
    generated: DateTime<Utc>,
) -> std::fmt::Result {
    writeln!(out, "# Configuration Validation Report")?;
    writeln!(out, "Generated: {}", generated.to_rfc3339())?;
    writeln!(out)?;
    writeln!(out, "## Summary")?;
    writeln!(out, "- Total Checks: {}", summary.total_checks)?;
    writeln!(out, "- Passed: {}", summary.passed_checks)?;
    writeln!(out, "- Failed: {}", summary.failed_checks)?;
    writeln!(out, "- Auto-fixable Failures: {}", summary.auto_fixable_failures)?;
    writeln!(out, "- Overall Status: {}", summary.overall_status())?;
    writeln!(out)?;
    writeln!(out, "## Detailed Results")?;

    for (i, result) in summary.results.iter().enumerate() {
        write!(out, "{}. {}", i + 1, if result.passed { "PASS" } else { "FAIL" })?;
        if !result.passed {
            write!(out, " [{}]", result.severity)?;
        }
        if result.auto_fixable {
            write!(out, " [AUTO-FIXABLE]")?;
        }
        writeln!(out, " {}: {}", result.check, result.message)?;
        if let Some(action) = result.fix_action {
            writeln!(out, "   -> Fix Action: {action}")?;
        }
    }
    Ok(())
}

/// Write the text validation report. Returns its path.
pub fn write_validation_report(
    dir: &Path,
    summary: &ValidationSummary,
    now: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("config-validation-{}.txt", now.format(TIMESTAMP_FORMAT)));
    std::fs::write(&path, render_validation(summary, now))?;
    info!(path = %path.display(), status = summary.overall_status(), "Validation report saved");
    Ok(path)
}

/// Write the JSON repair cycle report. Returns its path.
pub fn write_repair_report(
    dir: &Path,
    cycle: &RepairCycle,
    now: DateTime<Utc>,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("config-repair-{}.json", now.format(TIMESTAMP_FORMAT)));
    let json = serde_json::to_string_pretty(cycle)?;
    std::fs::write(&path, json)?;
    info!(path = %path.display(), success = cycle.success, "Repair report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{FixAction, Severity, ValidationResult};
    use chrono::TimeZone;

    fn summary() -> ValidationSummary {
        ValidationSummary::from_results(vec![
            ValidationResult::pass("env_file", "env file present"),
            ValidationResult::fixable("secret_key", "SECRET_KEY too short", FixAction::GenerateSecretKey)
                .with_severity(Severity::Warning),
            ValidationResult::fail("database", "database unreachable"),
        ])
    }

    #[test]
    fn text_report_lists_counts_and_results() {
        let text = render_validation(&summary(), Utc::now());
        assert!(text.contains("- Total Checks: 3"));
        assert!(text.contains("- Failed: 2"));
        assert!(text.contains("- Auto-fixable Failures: 1"));
        assert!(text.contains("- Overall Status: FAIL"));
        assert!(text.contains("1. PASS env_file: env file present"));
        assert!(text.contains("2. FAIL [WARNING] [AUTO-FIXABLE] secret_key: SECRET_KEY too short"));
        assert!(text.contains("   -> Fix Action: generate_secret_key"));
        assert!(text.contains("3. FAIL [ERROR] database: database unreachable"));
    }

    #[test]
    fn report_file_is_timestamped() {
        let tmp = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let path = write_validation_report(&tmp.path().join("reports"), &summary(), now).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "config-validation-20260304_050607.txt"
        );
        assert!(std::fs::read_to_string(path).unwrap().contains("Overall Status: FAIL"));
    }
}
