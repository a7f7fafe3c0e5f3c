//! One function per fix tag. Each reads the target, decides whether anything
//! needs to change, and only then backs up and writes.

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use super::templates::{self, Template};
use super::{secrets, ActionReport, AutoRepair, RepairError};
use crate::config::defaults::{
    APPENDED_VARS_HEADER, DEFAULT_KEY_ID_VAR, ENCRYPTION_CIPHER, MIN_KEY_BYTES, MIN_SECRET_KEY_LEN,
};
use crate::config::ServiceProfile;
use crate::store::{backup, document, permissions, EnvFile};
use crate::validation::checks::{validate_base64, validate_encryption_keys, ENCRYPTION_KEY_FIELDS};
use crate::validation::{DocumentFormat, FixAction, FixTarget, Ownership};

fn describe(target: Option<&FixTarget>) -> String {
    match target {
        None => "a result without a target".to_string(),
        Some(t) => {
            let kind = match t {
                FixTarget::File { .. } => "file",
                FixTarget::EnvVars { .. } => "env_vars",
                FixTarget::EnvField { .. } => "env_field",
                FixTarget::EncryptionKey { .. } => "encryption_key",
                FixTarget::Permissions { .. } => "permissions",
                FixTarget::Document { .. } => "document",
            };
            format!("{kind} target {}", t.path().display())
        }
    }
}

impl AutoRepair {
    /// Route a fix tag to its action. A target of the wrong shape is a
    /// mismatch and nothing is touched.
    pub(super) fn apply(
        &self,
        action: FixAction,
        target: Option<&FixTarget>,
    ) -> Result<ActionReport, RepairError> {
        let mismatch = || RepairError::TargetMismatch {
            action,
            found: describe(target),
        };

        match action {
            FixAction::GenerateBase64Key => match target {
                Some(FixTarget::EnvField { path, key }) => self.generate_base64_key(path, key),
                _ => Err(mismatch()),
            },
            FixAction::GenerateSecretKey => match target {
                Some(FixTarget::EnvField { path, key }) => self.generate_secret_key(path, key),
                _ => Err(mismatch()),
            },
            FixAction::GenerateEncryptionKeys => match target {
                Some(FixTarget::EnvField { path, key }) => self.generate_encryption_keys(path, key),
                _ => Err(mismatch()),
            },
            FixAction::RegenerateEncryptionKey => match target {
                Some(FixTarget::EncryptionKey { path, key, index }) => {
                    self.regenerate_encryption_key(path, key, *index)
                }
                _ => Err(mismatch()),
            },
            FixAction::FixEncryptionKeyStructure => match target {
                Some(FixTarget::EncryptionKey { path, key, index }) => {
                    self.fix_encryption_key_structure(path, key, *index)
                }
                _ => Err(mismatch()),
            },
            FixAction::FixJsonStructure => match target {
                Some(FixTarget::EnvField { path, key }) => self.generate_encryption_keys(path, key),
                Some(FixTarget::Document {
                    path,
                    format,
                    required_keys,
                }) => self.fix_document_structure(path, *format, required_keys),
                _ => Err(mismatch()),
            },
            FixAction::CreateFromTemplate => match target {
                Some(FixTarget::File { path }) => self.create_from_template(path),
                _ => Err(mismatch()),
            },
            FixAction::FixPermissions => match target {
                Some(FixTarget::Permissions { path, expected }) => {
                    self.fix_permissions(path, *expected)
                }
                _ => Err(mismatch()),
            },
            FixAction::AddMissingEnvVars => match target {
                Some(FixTarget::EnvVars { path, keys }) => self.add_missing_env_vars(path, keys),
                _ => Err(mismatch()),
            },
            FixAction::PopulateEmptyEnvVars => match target {
                Some(FixTarget::EnvVars { path, keys }) => self.populate_empty_env_vars(path, keys),
                _ => Err(mismatch()),
            },
            FixAction::RepairConfigSyntax => match target {
                Some(FixTarget::File { path }) => self.repair_config_syntax(path),
                _ => Err(mismatch()),
            },
            FixAction::InitializeDataFile => match target {
                Some(FixTarget::File { path }) => self.initialize_data_file(path),
                _ => Err(mismatch()),
            },
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// The profile declaring `path`; an empty one when no profile does.
    fn profile_for(&self, path: &Path) -> ServiceProfile {
        self.validator()
            .profiles()
            .iter()
            .find(|p| p.owns(path))
            .cloned()
            .unwrap_or_else(|| ServiceProfile::named(""))
    }

    fn read_env(path: &Path) -> Result<EnvFile, RepairError> {
        EnvFile::read(path).map_err(RepairError::io(path))
    }

    /// Write `contents` to `path` if it differs from what is there, backing
    /// up the old file first.
    fn commit(&self, path: &Path, contents: &str, report: &mut ActionReport) -> Result<bool, RepairError> {
        let current = fs::read_to_string(path).ok();
        if current.as_deref() == Some(contents) {
            return Ok(false);
        }
        if let Some(b) = backup::backup_file(path, self.clock.now()).map_err(RepairError::io(path))? {
            report.backups.push(b);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(RepairError::io(parent))?;
        }
        fs::write(path, contents).map_err(RepairError::io(path))?;
        Ok(true)
    }

    /// Compared line by line, so a missing trailing newline alone never
    /// triggers a rewrite.
    fn commit_env(&self, path: &Path, env: &EnvFile, report: &mut ActionReport) -> Result<bool, RepairError> {
        let current = fs::read_to_string(path).ok().map(|c| EnvFile::parse(&c));
        if current.as_ref() == Some(env) {
            return Ok(false);
        }
        self.commit(path, &env.render(), report)
    }

    /// Apply the ownership a profile declares for `path`, if any.
    fn apply_declared_ownership(&self, path: &Path) -> Result<(), RepairError> {
        let profile = self.profile_for(path);
        let Some(spec) = profile.path_spec(path) else {
            return Ok(());
        };
        let expected = spec.expected().map_err(RepairError::Invalid)?;
        permissions::apply(path, expected).map_err(RepairError::io(path))?;
        Ok(())
    }

    fn load_key_list(env: &EnvFile, var: &str) -> Result<Vec<Value>, RepairError> {
        let raw = env
            .value(var)
            .ok_or_else(|| RepairError::Invalid(format!("{var} is not set")))?;
        match serde_json::from_str(raw) {
            Ok(Value::Array(list)) => Ok(list),
            _ => Err(RepairError::Invalid(format!("{var} is not a JSON list"))),
        }
    }

    // ------------------------------------------------------------------
    // Env field actions
    // ------------------------------------------------------------------

    fn generate_base64_key(&self, path: &Path, key: &str) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        if env
            .value(key)
            .is_some_and(|v| validate_base64(v, key, MIN_KEY_BYTES).passed)
        {
            return Ok(ActionReport::unchanged(format!("{key} already valid")));
        }
        env.upsert(key, &secrets::generate_base64_key());
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("generated new {key} in {}", path.display());
        Ok(report)
    }

    fn generate_secret_key(&self, path: &Path, key: &str) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        if env
            .value(key)
            .is_some_and(|v| v.chars().count() >= MIN_SECRET_KEY_LEN)
        {
            return Ok(ActionReport::unchanged(format!("{key} already strong")));
        }
        env.upsert(key, &secrets::generate_secret_key());
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("generated new {key} in {}", path.display());
        Ok(report)
    }

    fn generate_encryption_keys(&self, path: &Path, var: &str) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let needs_new_list = env.value(var).map_or(true, |raw| {
            validate_encryption_keys(raw, path, var)
                .iter()
                .any(|r| r.fix_action == Some(FixAction::GenerateEncryptionKeys))
        });
        if !needs_new_list {
            return Ok(ActionReport::unchanged(format!("{var} already a key list")));
        }

        let (list, id) = secrets::generate_encryption_keys();
        env.upsert(var, &list);
        env.upsert(DEFAULT_KEY_ID_VAR, &id);
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("generated new {var} with active key {id}");
        Ok(report)
    }

    fn regenerate_encryption_key(
        &self,
        path: &Path,
        var: &str,
        index: usize,
    ) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let mut list = Self::load_key_list(&env, var)?;
        let entry = list
            .get_mut(index)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| RepairError::Invalid(format!("{var}[{index}] is not a key entry")))?;

        let current_key = entry.get("key").and_then(Value::as_str).unwrap_or_default();
        if validate_base64(current_key, var, MIN_KEY_BYTES).passed {
            return Ok(ActionReport::unchanged(format!("{var}[{index}] key already valid")));
        }

        let old_id = entry.get("id").and_then(Value::as_str).map(str::to_string);
        let new_id = uuid::Uuid::new_v4().to_string();
        entry.insert("id".into(), Value::String(new_id.clone()));
        entry.insert("key".into(), Value::String(secrets::generate_base64_key()));

        env.upsert(var, &Value::Array(list).to_string());
        if old_id.is_some() && env.value(DEFAULT_KEY_ID_VAR) == old_id.as_deref() {
            env.set(DEFAULT_KEY_ID_VAR, &new_id);
        }

        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("regenerated {var}[{index}] as {new_id}");
        Ok(report)
    }

    fn fix_encryption_key_structure(
        &self,
        path: &Path,
        var: &str,
        index: usize,
    ) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let mut list = Self::load_key_list(&env, var)?;
        let entry = list
            .get_mut(index)
            .ok_or_else(|| RepairError::Invalid(format!("{var} has no entry {index}")))?;

        let mut filled = Vec::new();
        match entry.as_object_mut() {
            Some(map) => {
                for field in ENCRYPTION_KEY_FIELDS {
                    if map.contains_key(field) {
                        continue;
                    }
                    let value = match field {
                        "id" => Value::String(uuid::Uuid::new_v4().to_string()),
                        "key" => Value::String(secrets::generate_base64_key()),
                        "cipher" => Value::String(ENCRYPTION_CIPHER.to_string()),
                        _ => Value::Bool(false),
                    };
                    map.insert(field.to_string(), value);
                    filled.push(field);
                }
            }
            None => {
                *entry = secrets::encryption_key_entry().0;
                filled.extend(ENCRYPTION_KEY_FIELDS);
            }
        }
        if filled.is_empty() {
            return Ok(ActionReport::unchanged(format!("{var}[{index}] already complete")));
        }

        env.upsert(var, &Value::Array(list).to_string());
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("filled {var}[{index}] fields: {}", filled.join(", "));
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Env variable sets
    // ------------------------------------------------------------------

    fn add_missing_env_vars(&self, path: &Path, keys: &[String]) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let profile = self.profile_for(path);

        // Later defaults may depend on earlier ones (key id on key list)
        let mut scratch = env.clone();
        let mut additions = Vec::new();
        for key in keys {
            if scratch.contains(key) {
                continue;
            }
            match templates::default_value(&profile, &scratch, key) {
                Some(value) => {
                    scratch.upsert(key, &value);
                    additions.push((key.clone(), value));
                }
                None => warn!(key = %key, path = %path.display(), "No default value, skipping"),
            }
        }

        env.append_block(APPENDED_VARS_HEADER, &additions);
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;

        let missing: Vec<String> = keys.iter().filter(|k| !env.contains(k)).cloned().collect();
        if !missing.is_empty() {
            return Err(RepairError::NoDefault(missing));
        }
        let added: Vec<&str> = additions.iter().map(|(k, _)| k.as_str()).collect();
        report.detail = if added.is_empty() {
            "all variables already present".to_string()
        } else {
            format!("added {} to {}", added.join(", "), path.display())
        };
        Ok(report)
    }

    fn populate_empty_env_vars(&self, path: &Path, keys: &[String]) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let profile = self.profile_for(path);

        let mut populated = Vec::new();
        for key in templates::unresolved_keys(&env, keys) {
            if !env.contains(&key) {
                continue;
            }
            if let Some(value) = templates::default_value(&profile, &env, &key) {
                env.set(&key, &value);
                populated.push(key);
            } else {
                warn!(key = %key, path = %path.display(), "No default value, leaving empty");
            }
        }

        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;

        let unresolved = templates::unresolved_keys(&env, keys);
        if !unresolved.is_empty() {
            return Err(RepairError::NoDefault(unresolved));
        }
        report.detail = if populated.is_empty() {
            "no empty variables".to_string()
        } else {
            format!("populated {}", populated.join(", "))
        };
        Ok(report)
    }

    fn repair_config_syntax(&self, path: &Path) -> Result<ActionReport, RepairError> {
        let mut env = Self::read_env(path)?;
        let repaired = env.repair_syntax();
        if repaired == 0 {
            return Ok(ActionReport::unchanged("no malformed lines"));
        }
        let mut report = ActionReport::default();
        self.commit_env(path, &env, &mut report)?;
        report.detail = format!("rewrote {repaired} malformed line(s) in {}", path.display());
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Whole files
    // ------------------------------------------------------------------

    fn fix_document_structure(
        &self,
        path: &Path,
        format: DocumentFormat,
        required_keys: &[String],
    ) -> Result<ActionReport, RepairError> {
        let profile = self.profile_for(path);
        let template = profile.document(path).and_then(|d| d.template.clone());

        let doc_err = |source| RepairError::Document {
            path: path.to_path_buf(),
            source,
        };
        let parsed = document::read(path, format).ok().filter(Value::is_object);
        let (value, detail) = match parsed {
            Some(mut value) => {
                if document::missing_keys(&value, required_keys).is_empty() {
                    return Ok(ActionReport::unchanged("document already complete"));
                }
                let unresolved = templates::fill_missing_keys(&mut value, template.as_ref(), required_keys);
                if !unresolved.is_empty() {
                    return Err(RepairError::NoDefault(unresolved));
                }
                (value, "added missing keys from template")
            }
            None => {
                let value = template.ok_or_else(|| RepairError::NoTemplate(path.to_path_buf()))?;
                (value, "rewrote unparseable document from template")
            }
        };

        let rendered = document::render(&value, format).map_err(doc_err)?;
        let mut report = ActionReport::default();
        if !self.commit(path, &rendered, &mut report)? {
            return Ok(ActionReport::unchanged("document already complete"));
        }
        report.detail = format!("{detail}: {}", path.display());
        Ok(report)
    }

    fn create_from_template(&self, path: &Path) -> Result<ActionReport, RepairError> {
        if path.exists() {
            return Ok(ActionReport::unchanged(format!("{} already exists", path.display())));
        }
        let template = templates::resolve(self.validator().profiles(), path, self.clock.now())
            .ok_or_else(|| RepairError::NoTemplate(path.to_path_buf()))?;

        let mut report = ActionReport::default();
        match template {
            Template::Env(contents) => {
                self.commit(path, &contents, &mut report)?;
            }
            Template::Document { format, value } => {
                let rendered = document::render(&value, format).map_err(|source| {
                    RepairError::Document {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                self.commit(path, &rendered, &mut report)?;
            }
            Template::EmptyFile => {
                self.commit(path, "", &mut report)?;
            }
            Template::Directory => {
                fs::create_dir_all(path).map_err(RepairError::io(path))?;
            }
        }
        self.apply_declared_ownership(path)?;
        info!(path = %path.display(), "Created from template");
        report.detail = format!("created {} from template", path.display());
        Ok(report)
    }

    fn fix_permissions(&self, path: &Path, expected: Ownership) -> Result<ActionReport, RepairError> {
        let mut report = if path.exists() {
            ActionReport::default()
        } else {
            self.create_from_template(path)?
        };
        let changed = permissions::apply(path, expected).map_err(RepairError::io(path))?;
        report.detail = if changed {
            format!("set {} to {expected}", path.display())
        } else if report.detail.is_empty() {
            format!("{} already {expected}", path.display())
        } else {
            format!("{}, owned {expected}", report.detail)
        };
        Ok(report)
    }

    fn initialize_data_file(&self, path: &Path) -> Result<ActionReport, RepairError> {
        if path.exists() {
            return Ok(ActionReport::unchanged(format!("{} already exists", path.display())));
        }
        let mut report = ActionReport::default();
        self.commit(path, "", &mut report)?;
        self.apply_declared_ownership(path)?;
        report.detail = format!("initialized empty {}", path.display());
        Ok(report)
    }
}
