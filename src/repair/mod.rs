//! Configuration Auto-Repair Engine
//!
//! Maps each failing, auto-fixable [`ValidationResult`] to a repair action
//! through its fix tag and typed target, then re-runs the validator to see
//! whether the failure count went down.
//!
//! Actions are idempotent: a target that is already correct is left alone
//! and no backup is taken.

mod actions;
pub mod secrets;
pub mod templates;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::store::DocumentError;
use crate::validation::{ConfigValidator, FixAction, ValidationResult, ValidationSummary};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("{action} cannot be applied to {found}")]
    TargetMismatch { action: FixAction, found: String },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("document error on {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        source: DocumentError,
    },
    #[error("no template declared for {}", .0.display())]
    NoTemplate(PathBuf),
    #[error("no safe default for: {}", .0.join(", "))]
    NoDefault(Vec<String>),
    #[error("{0}")]
    Invalid(String),
}

impl RepairError {
    fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| RepairError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// Summary types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairStatus {
    Success,
    Failed,
    Skipped,
}

/// What happened to one failing result.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub action: FixAction,
    pub check: String,
    /// Message of the validation result being repaired
    pub message: String,
    pub status: RepairStatus,
    pub detail: String,
}

/// Counts and outcomes for one `repair` call.
#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub total_failures: usize,
    pub attempted_repairs: usize,
    pub successful_repairs: usize,
    pub failed_repairs: usize,
    pub outcomes: Vec<RepairOutcome>,
    /// Backup files written before mutations
    pub backups: Vec<PathBuf>,
    pub generated_at: DateTime<Utc>,
}

/// Validate, repair, re-validate.
#[derive(Debug, Clone, Serialize)]
pub struct RepairCycle {
    pub initial: ValidationSummary,
    pub repairs: Option<RepairSummary>,
    pub post_repair: ValidationSummary,
    pub success: bool,
}

impl RepairCycle {
    /// Error-severity failures left after the cycle.
    pub fn blocking_failures(&self) -> Vec<&ValidationResult> {
        self.post_repair
            .results
            .iter()
            .filter(|r| r.is_blocking())
            .collect()
    }
}

/// Result of running one action: what changed and which backups were taken.
#[derive(Debug, Default)]
struct ActionReport {
    detail: String,
    backups: Vec<PathBuf>,
}

impl ActionReport {
    fn unchanged(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            backups: Vec::new(),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct AutoRepair {
    validator: ConfigValidator,
    clock: SharedClock,
}

impl AutoRepair {
    pub fn new(validator: ConfigValidator, clock: SharedClock) -> Self {
        Self { validator, clock }
    }

    pub fn validator(&self) -> &ConfigValidator {
        &self.validator
    }

    /// Apply every failing auto-fixable result. One failed repair never stops
    /// the rest.
    pub fn repair(&self, results: &[ValidationResult]) -> RepairSummary {
        let mut summary = RepairSummary {
            total_failures: 0,
            attempted_repairs: 0,
            successful_repairs: 0,
            failed_repairs: 0,
            outcomes: Vec::new(),
            backups: Vec::new(),
            generated_at: self.clock.now(),
        };

        for result in results.iter().filter(|r| !r.passed && r.auto_fixable) {
            let Some(action) = result.fix_action else {
                continue;
            };
            summary.total_failures += 1;

            let (status, detail) = match self.apply(action, result.target.as_ref()) {
                Err(e @ RepairError::TargetMismatch { .. }) => {
                    warn!(action = %action, check = %result.check, error = %e, "Repair skipped");
                    summary.failed_repairs += 1;
                    (RepairStatus::Skipped, e.to_string())
                }
                Ok(report) => {
                    summary.attempted_repairs += 1;
                    summary.successful_repairs += 1;
                    info!(action = %action, detail = %report.detail, "Repaired");
                    summary.backups.extend(report.backups);
                    (RepairStatus::Success, report.detail)
                }
                Err(e) => {
                    summary.attempted_repairs += 1;
                    summary.failed_repairs += 1;
                    error!(action = %action, check = %result.check, error = %e, "Repair failed");
                    (RepairStatus::Failed, e.to_string())
                }
            };

            summary.outcomes.push(RepairOutcome {
                action,
                check: result.check.clone(),
                message: result.message.clone(),
                status,
                detail,
            });
        }

        info!(
            successful = summary.successful_repairs,
            attempted = summary.attempted_repairs,
            failed = summary.failed_repairs,
            "Repair pass complete"
        );
        summary
    }

    /// Validate every profile, repair, and validate again.
    pub async fn repair_cycle(&self) -> RepairCycle {
        let initial = self.validator.validate_all().await;
        self.finish_cycle(initial, None).await
    }

    /// Same cycle restricted to one service profile.
    pub async fn repair_service(&self, service: &str) -> RepairCycle {
        let initial =
            ValidationSummary::from_results(self.validator.validate_service(service).await);
        self.finish_cycle(initial, Some(service)).await
    }

    async fn finish_cycle(&self, initial: ValidationSummary, service: Option<&str>) -> RepairCycle {
        if initial.passed() {
            info!("No repairs needed, all checks passed");
            return RepairCycle {
                post_repair: initial.clone(),
                initial,
                repairs: None,
                success: true,
            };
        }

        let repairs = self.repair(&initial.results);
        let post_repair = match service {
            Some(name) => ValidationSummary::from_results(self.validator.validate_service(name).await),
            None => self.validator.validate_all().await,
        };
        let success = post_repair.failed_checks < initial.failed_checks;
        info!(
            before = initial.failed_checks,
            after = post_repair.failed_checks,
            success,
            "Repair cycle complete"
        );

        RepairCycle {
            initial,
            repairs: Some(repairs),
            post_repair,
            success,
        }
    }
}
