//! Canonical content for files the repair engine has to create or fill in.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

use super::secrets;
use crate::config::defaults::{DEFAULT_CACHE_PORT, DEFAULT_DATABASE_PORT, DEFAULT_KEY_ID_VAR};
use crate::config::{PathKind, ServiceProfile};
use crate::store::{is_blank_value, EnvFile};
use crate::validation::DocumentFormat;

/// Values used for well-known variables when a profile sets none.
fn builtin_default(key: &str) -> Option<String> {
    let value = match key {
        "DATABASE_HOST" => "database",
        "DATABASE_NAME" => "app",
        "DATABASE_USER" => "app",
        "REDIS_HOST" => "cache",
        "REDIS_INDEX" => "0",
        "ALLOWED_HOSTS" => "localhost,127.0.0.1",
        "DEBUG" => "off",
        "SECURE_SSL_REDIRECT" => "off",
        "DATABASE_PORT" => return Some(DEFAULT_DATABASE_PORT.to_string()),
        "REDIS_PORT" => return Some(DEFAULT_CACHE_PORT.to_string()),
        _ => return None,
    };
    Some(value.to_string())
}

/// Value to write for `key`, or `None` when nothing safe is known.
///
/// Profile defaults win; secrets are generated fresh; `env` is consulted so
/// that the active key id follows the key list already in the file.
pub fn default_value(profile: &ServiceProfile, env: &EnvFile, key: &str) -> Option<String> {
    if let Some(v) = profile.defaults.get(key) {
        return Some(v.clone());
    }
    if profile.secret_key_var.as_deref() == Some(key) || key == "SECRET_KEY" {
        return Some(secrets::generate_secret_key());
    }
    if profile.encryption_keys_var.as_deref() == Some(key) {
        return Some(secrets::generate_encryption_keys().0);
    }
    if key == DEFAULT_KEY_ID_VAR {
        return profile
            .encryption_keys_var
            .as_deref()
            .and_then(|var| env.value(var))
            .and_then(first_key_id);
    }
    if profile.base64_vars.iter().any(|v| v == key) {
        return Some(secrets::generate_base64_key());
    }
    if key.ends_with("_PASSWORD") {
        return Some(secrets::generate_password());
    }
    builtin_default(key)
}

fn first_key_id(raw: &str) -> Option<String> {
    let list: Value = serde_json::from_str(raw).ok()?;
    list.get(0)?.get("id")?.as_str().map(str::to_string)
}

/// A complete env file for `profile`: generated secrets, required
/// variables and configured defaults.
pub fn render_env_template(profile: &ServiceProfile, now: DateTime<Utc>) -> String {
    let mut env = EnvFile::parse(&format!(
        "# {} configuration\n# Generated by fleet-healer auto-repair at {}\n",
        profile.name,
        now.to_rfc3339()
    ));

    let mut keys: Vec<String> = Vec::new();
    keys.extend(profile.secret_key_var.iter().cloned());
    if let Some(ref var) = profile.encryption_keys_var {
        keys.push(var.clone());
        keys.push(DEFAULT_KEY_ID_VAR.to_string());
    }
    keys.extend(profile.base64_vars.iter().cloned());
    keys.extend(profile.required_vars.iter().cloned());
    keys.extend(profile.defaults.keys().cloned());

    for key in keys {
        if env.contains(&key) {
            continue;
        }
        match default_value(profile, &env, &key) {
            Some(value) => {
                env.upsert(&key, &value);
            }
            None => warn!(service = %profile.name, key = %key, "No default value, leaving out of template"),
        }
    }
    env.render()
}

/// What a missing path should be created as.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Env(String),
    Document { format: DocumentFormat, value: Value },
    EmptyFile,
    Directory,
}

/// Find the template for `path` among the profiles that declare it.
pub fn resolve(profiles: &[ServiceProfile], path: &Path, now: DateTime<Utc>) -> Option<Template> {
    let profile = profiles.iter().find(|p| p.owns(path))?;
    if profile.env_file.as_deref() == Some(path) {
        return Some(Template::Env(render_env_template(profile, now)));
    }
    if let Some(doc) = profile.document(path) {
        return doc.template.clone().map(|value| Template::Document {
            format: doc.format,
            value,
        });
    }
    if profile.data_files.iter().any(|p| p == path) {
        return Some(Template::EmptyFile);
    }
    profile.path_spec(path).map(|spec| match spec.kind {
        PathKind::Directory => Template::Directory,
        PathKind::File => Template::EmptyFile,
    })
}

/// Missing keys filled from a document template. Returns the keys the
/// template could not supply.
pub fn fill_missing_keys(value: &mut Value, template: Option<&Value>, required: &[String]) -> Vec<String> {
    let mut unresolved = Vec::new();
    let Some(map) = value.as_object_mut() else {
        return required.to_vec();
    };
    for key in required {
        if map.contains_key(key) {
            continue;
        }
        match template.and_then(|t| t.get(key)) {
            Some(v) => {
                map.insert(key.clone(), v.clone());
            }
            None => unresolved.push(key.clone()),
        }
    }
    unresolved
}

/// Keys among `keys` that are still missing or blank.
pub fn unresolved_keys(env: &EnvFile, keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter(|k| env.get(k).map_or(true, is_blank_value))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::checks::validate_encryption_keys;
    use std::path::PathBuf;

    fn profile() -> ServiceProfile {
        let mut p = ServiceProfile::named("reporting");
        p.env_file = Some(PathBuf::from("/srv/reporting/.env"));
        p.secret_key_var = Some("SECRET_KEY".into());
        p.encryption_keys_var = Some("ENCRYPTION_KEYS".into());
        p.required_vars = vec!["DATABASE_HOST".into(), "REDIS_PASSWORD".into(), "CUSTOM".into()];
        p.defaults.insert("REDIS_HOST".into(), "reporting-redis".into());
        p
    }

    #[test]
    fn env_template_links_key_id_to_key_list() {
        let rendered = render_env_template(&profile(), Utc::now());
        let env = EnvFile::parse(&rendered);

        let keys = env.value("ENCRYPTION_KEYS").unwrap();
        assert!(validate_encryption_keys(keys, Path::new("/x"), "ENCRYPTION_KEYS")
            .iter()
            .all(|r| r.passed));
        assert_eq!(
            env.value(DEFAULT_KEY_ID_VAR).map(str::to_string),
            first_key_id(keys)
        );
        assert_eq!(env.value("SECRET_KEY").unwrap().len(), 64);
        assert_eq!(env.value("DATABASE_HOST"), Some("database"));
        assert_eq!(env.value("REDIS_HOST"), Some("reporting-redis"));
        assert_eq!(env.value("REDIS_PASSWORD").unwrap().len(), 32);
        // no safe default
        assert!(!env.contains("CUSTOM"));
    }

    #[test]
    fn resolve_by_declared_role() {
        let mut p = profile();
        p.data_files.push(PathBuf::from("/srv/reporting/state.db"));
        let profiles = vec![p];
        let now = Utc::now();

        assert!(matches!(
            resolve(&profiles, Path::new("/srv/reporting/.env"), now),
            Some(Template::Env(_))
        ));
        assert_eq!(
            resolve(&profiles, Path::new("/srv/reporting/state.db"), now),
            Some(Template::EmptyFile)
        );
        assert_eq!(resolve(&profiles, Path::new("/etc/passwd"), now), None);
    }

    #[test]
    fn fill_missing_keys_keeps_siblings() {
        let mut doc = serde_json::json!({"agent": {"id": 7}});
        let template = serde_json::json!({"agent": {"id": 0}, "server": {"port": 443}});
        let unresolved = fill_missing_keys(
            &mut doc,
            Some(&template),
            &["agent".into(), "server".into(), "extra".into()],
        );
        assert_eq!(unresolved, vec!["extra".to_string()]);
        assert_eq!(doc["agent"]["id"], 7);
        assert_eq!(doc["server"]["port"], 443);
    }
}
