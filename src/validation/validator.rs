//! Runs the checks each service profile declares.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::checks;
use super::probes;
use super::result::{FixAction, FixTarget, ValidationResult, ValidationSummary};
use crate::config::defaults::{DEFAULT_CACHE_PORT, DEFAULT_DATABASE_PORT, MIN_KEY_BYTES};
use crate::config::{HealerConfig, ServiceProfile};
use crate::store::{document, is_blank_value, EnvFile};

/// Stateless validator over a fixed set of service profiles.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    profiles: Vec<ServiceProfile>,
    probe_timeout: Duration,
}

impl ConfigValidator {
    pub fn new(profiles: Vec<ServiceProfile>, probe_timeout: Duration) -> Self {
        Self {
            profiles,
            probe_timeout,
        }
    }

    pub fn from_config(config: &HealerConfig) -> Self {
        Self::new(
            config.services.clone(),
            Duration::from_secs(config.probes.timeout_secs),
        )
    }

    pub fn profiles(&self) -> &[ServiceProfile] {
        &self.profiles
    }

    /// Results for one named profile. An unknown name is a single failure.
    pub async fn validate_service(&self, name: &str) -> Vec<ValidationResult> {
        match self.profiles.iter().find(|p| p.name == name) {
            Some(profile) => self.validate_profile(profile).await,
            None => vec![ValidationResult::fail(
                "profile",
                format!("no configuration profile named '{name}'"),
            )],
        }
    }

    /// Every profile, logged and summarized.
    pub async fn validate_all(&self) -> ValidationSummary {
        let mut results = Vec::new();
        for profile in &self.profiles {
            results.extend(self.validate_profile(profile).await);
        }
        for r in &results {
            r.log();
        }
        let summary = ValidationSummary::from_results(results);
        info!(
            total = summary.total_checks,
            passed = summary.passed_checks,
            failed = summary.failed_checks,
            auto_fixable = summary.auto_fixable_failures,
            status = summary.overall_status(),
            "Configuration validation complete"
        );
        summary
    }

    pub async fn validate_profile(&self, profile: &ServiceProfile) -> Vec<ValidationResult> {
        if !profile.enabled {
            return vec![ValidationResult::pass(
                "profile",
                format!("validation disabled for {}", profile.name),
            )];
        }
        debug!(service = %profile.name, "Validating service profile");

        let mut results = Vec::new();
        if let Some(ref env_path) = profile.env_file {
            results.extend(self.validate_env_file(profile, env_path).await);
        }
        for spec in &profile.paths {
            match spec.expected() {
                Ok(expected) => results.push(checks::validate_permissions(&spec.path, expected)),
                Err(e) => results.push(ValidationResult::fail("permissions", e)),
            }
        }
        for spec in &profile.documents {
            let label = spec.path.display().to_string();
            if !spec.path.exists() {
                results.push(checks::validate_exists(
                    &spec.path,
                    "document",
                    FixAction::CreateFromTemplate,
                ));
                continue;
            }
            let result = match std::fs::read_to_string(&spec.path) {
                Ok(payload) => {
                    checks::validate_structure(&payload, spec.format, &spec.required_keys, &label)
                }
                Err(e) => ValidationResult::fail("document", format!("cannot read {label}: {e}")),
            };
            results.push(result.with_target(FixTarget::Document {
                path: spec.path.clone(),
                format: spec.format,
                required_keys: spec.required_keys.clone(),
            }));
        }
        for path in &profile.data_files {
            results.push(checks::validate_exists(
                path,
                "data_file",
                FixAction::InitializeDataFile,
            ));
        }
        results
    }

    async fn validate_env_file(
        &self,
        profile: &ServiceProfile,
        path: &Path,
    ) -> Vec<ValidationResult> {
        let exists = checks::validate_exists(path, "env_file", FixAction::CreateFromTemplate);
        if !exists.passed {
            return vec![exists];
        }
        let env = match EnvFile::read(path) {
            Ok(env) => env,
            Err(e) => {
                return vec![ValidationResult::fail(
                    "env_file",
                    format!("cannot read {}: {e}", path.display()),
                )]
            }
        };

        let mut results = vec![exists, checks::validate_env_syntax(&env, path)];
        if !profile.required_vars.is_empty() {
            results.extend(checks::validate_presence(&env, &profile.required_vars, path));
        }

        if let Some(ref var) = profile.secret_key_var {
            if let Some(value) = env.value(var) {
                results.push(checks::validate_secret_key(value, path, var));
            }
        }

        if let Some(ref var) = profile.encryption_keys_var {
            if let Some(raw) = env.value(var) {
                results.extend(checks::validate_encryption_keys(raw, path, var));
            }
        }

        for var in &profile.base64_vars {
            if let Some(value) = env.value(var) {
                results.push(
                    checks::validate_base64(value, var, MIN_KEY_BYTES).with_target(
                        FixTarget::EnvField {
                            path: path.to_path_buf(),
                            key: var.clone(),
                        },
                    ),
                );
            }
        }

        if profile.probe_database {
            if let Some(r) = self.probe_database(&env).await {
                results.push(r);
            }
        }
        if profile.probe_cache {
            if let Some(r) = self.probe_cache(&env).await {
                results.push(r);
            }
        }

        results
    }

    /// Runs only when the connection variables are all set; presence checks
    /// report them otherwise.
    async fn probe_database(&self, env: &EnvFile) -> Option<ValidationResult> {
        let vars = ["DATABASE_HOST", "DATABASE_NAME", "DATABASE_USER", "DATABASE_PASSWORD"];
        if vars.iter().any(|v| env.value(v).map_or(true, is_blank_value)) {
            return None;
        }
        let host = env.value("DATABASE_HOST")?;
        let port = env
            .value("DATABASE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_DATABASE_PORT);
        Some(probes::probe_database(host, port, self.probe_timeout).await)
    }

    async fn probe_cache(&self, env: &EnvFile) -> Option<ValidationResult> {
        let host = env.value("REDIS_HOST").filter(|h| !is_blank_value(h))?;
        let port = env
            .value("REDIS_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_CACHE_PORT);
        let password = env.value("REDIS_PASSWORD").filter(|p| !is_blank_value(p));
        Some(probes::probe_cache(host, port, password, self.probe_timeout).await)
    }
}
