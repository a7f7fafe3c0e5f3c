//! Validation result types shared by the validator and the repair engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// How bad a failing check is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Tag naming the repair that can address a failing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    GenerateBase64Key,
    GenerateSecretKey,
    GenerateEncryptionKeys,
    RegenerateEncryptionKey,
    FixEncryptionKeyStructure,
    FixJsonStructure,
    CreateFromTemplate,
    FixPermissions,
    AddMissingEnvVars,
    PopulateEmptyEnvVars,
    RepairConfigSyntax,
    InitializeDataFile,
}

impl std::fmt::Display for FixAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FixAction::GenerateBase64Key => "generate_base64_key",
            FixAction::GenerateSecretKey => "generate_secret_key",
            FixAction::GenerateEncryptionKeys => "generate_encryption_keys",
            FixAction::RegenerateEncryptionKey => "regenerate_encryption_key",
            FixAction::FixEncryptionKeyStructure => "fix_encryption_key_structure",
            FixAction::FixJsonStructure => "fix_json_structure",
            FixAction::CreateFromTemplate => "create_from_template",
            FixAction::FixPermissions => "fix_permissions",
            FixAction::AddMissingEnvVars => "add_missing_env_vars",
            FixAction::PopulateEmptyEnvVars => "populate_empty_env_vars",
            FixAction::RepairConfigSyntax => "repair_config_syntax",
            FixAction::InitializeDataFile => "initialize_data_file",
        };
        f.write_str(tag)
    }
}

/// Structured document formats the validator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Yaml,
}

/// Expected ownership and permission bits for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl std::fmt::Display for Ownership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {:03o}", self.uid, self.gid, self.mode)
    }
}

/// Where a repair should be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixTarget {
    /// A whole file (or directory) to materialize
    File { path: PathBuf },
    /// A set of variables in an env file
    EnvVars { path: PathBuf, keys: Vec<String> },
    /// One variable in an env file
    EnvField { path: PathBuf, key: String },
    /// One entry of a JSON encryption-key list stored in an env variable
    EncryptionKey {
        path: PathBuf,
        key: String,
        index: usize,
    },
    /// A path whose owner/mode must match
    Permissions { path: PathBuf, expected: Ownership },
    /// A standalone JSON/YAML document with required top-level keys
    Document {
        path: PathBuf,
        format: DocumentFormat,
        required_keys: Vec<String>,
    },
}

impl FixTarget {
    pub fn path(&self) -> &std::path::Path {
        match self {
            FixTarget::File { path }
            | FixTarget::EnvVars { path, .. }
            | FixTarget::EnvField { path, .. }
            | FixTarget::EncryptionKey { path, .. }
            | FixTarget::Permissions { path, .. }
            | FixTarget::Document { path, .. } => path,
        }
    }
}

/// Outcome of a single check. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Short name of the check that produced this result
    pub check: String,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
    pub auto_fixable: bool,
    pub fix_action: Option<FixAction>,
    pub target: Option<FixTarget>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn pass(check: &str, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: true,
            message: message.into(),
            severity: Severity::Info,
            auto_fixable: false,
            fix_action: None,
            target: None,
            timestamp: Utc::now(),
        }
    }

    /// Failing, not auto-fixable.
    pub fn fail(check: &str, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            severity: Severity::Error,
            ..Self::pass(check, message)
        }
    }

    /// Failing and auto-fixable through `action`.
    pub fn fixable(check: &str, message: impl Into<String>, action: FixAction) -> Self {
        Self {
            auto_fixable: true,
            fix_action: Some(action),
            ..Self::fail(check, message)
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: FixTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Failing with severity error.
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }

    /// Emit this result at a log level matching its severity.
    pub fn log(&self) {
        if self.passed {
            info!(check = %self.check, "{}", self.message);
            return;
        }
        match self.severity {
            Severity::Error => error!(
                check = %self.check,
                fix = ?self.fix_action,
                "{}",
                self.message
            ),
            Severity::Warning => warn!(
                check = %self.check,
                fix = ?self.fix_action,
                "{}",
                self.message
            ),
            Severity::Info => info!(check = %self.check, "{}", self.message),
        }
    }
}

/// Aggregate counts over a validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub auto_fixable_failures: usize,
    pub results: Vec<ValidationResult>,
    pub generated_at: DateTime<Utc>,
}

impl ValidationSummary {
    pub fn from_results(results: Vec<ValidationResult>) -> Self {
        let passed_checks = results.iter().filter(|r| r.passed).count();
        let auto_fixable_failures = results
            .iter()
            .filter(|r| !r.passed && r.auto_fixable)
            .count();
        Self {
            total_checks: results.len(),
            passed_checks,
            failed_checks: results.len() - passed_checks,
            auto_fixable_failures,
            results,
            generated_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failed_checks == 0
    }

    pub fn overall_status(&self) -> &'static str {
        if self.passed() {
            "PASS"
        } else {
            "FAIL"
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}
