//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, unknown section).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `HealerConfig`.
///
/// Array-of-table entries share one path (`services.name` covers every
/// profile). Must be kept in step with the structs in `healer_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        // [schedule]
        "schedule",
        "schedule.monitor_interval_secs",
        "schedule.validation_interval_secs",
        "schedule.log_cleanup_interval_secs",
        "schedule.backup_interval_secs",
        "schedule.settle_delay_secs",
        // [runtime]
        "runtime",
        "runtime.docker_bin",
        "runtime.command_timeout_secs",
        "runtime.self_name",
        "runtime.restart_loop_threshold",
        "runtime.discover_prefix",
        // [paths]
        "paths",
        "paths.report_dir",
        "paths.log_dir",
        "paths.log_retention_days",
        "paths.backup_root",
        "paths.backup_sources",
        // [probes]
        "probes",
        "probes.timeout_secs",
        // [[services]]
        "services",
        "services.name",
        "services.enabled",
        "services.env_file",
        "services.required_vars",
        "services.secret_key_var",
        "services.encryption_keys_var",
        "services.base64_vars",
        "services.probe_database",
        "services.probe_cache",
        "services.paths",
        "services.paths.path",
        "services.paths.owner",
        "services.paths.mode",
        "services.paths.kind",
        "services.documents",
        "services.documents.path",
        "services.documents.format",
        "services.documents.required_keys",
        "services.documents.template",
        "services.data_files",
        "services.defaults",
        // [[entities]]
        "entities",
        "entities.name",
        "entities.profile",
        "entities.strategy",
        "entities.strategy.type",
        "entities.strategy.paths",
        "entities.strategy.paths.path",
        "entities.strategy.paths.owner",
        "entities.strategy.paths.mode",
        "entities.strategy.paths.kind",
        "entities.strategy.host",
        "entities.strategy.port",
    ];
    keys.iter().copied().collect()
}

/// Tables whose keys are user data rather than config fields.
const OPEN_TABLES: &[&str] = &["services.defaults", "services.documents.template"];

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Arrays of tables contribute their members' keys
/// under the array's own path. Open tables are listed but not descended.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if OPEN_TABLES.contains(&path.as_str()) {
                continue;
            }
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        keys.extend(walk_toml_keys(item, &path));
                    }
                }
                _ => {}
            }
        }
    }
    keys.sort();
    keys.dedup();
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
