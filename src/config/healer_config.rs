//! Healer configuration: schedule, runtime, paths and the service profiles
//! whose configuration files are validated and repaired.
//!
//! Each section implements `Default` so that an empty file (or no file)
//! yields a working supervisor with no profiles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::store::permissions;
use crate::validation::{DocumentFormat, Ownership};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `HealerConfig::load()` which searches:
/// 1. `$HEALER_CONFIG` env var
/// 2. `./healer.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealerConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub probes: ProbeConfig,

    /// Configuration profiles, one per service
    #[serde(default)]
    pub services: Vec<ServiceProfile>,

    /// Supervised entities
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl HealerConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HEALER_CONFIG` environment variable
    /// 2. `./healer.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("HEALER_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), services = config.services.len(), "Loaded config from HEALER_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from HEALER_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "HEALER_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("healer.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(services = config.services.len(), "Loaded config from ./healer.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./healer.toml, using defaults");
                }
            }
        }

        info!("No healer.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Option<&ServiceProfile> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let s = &self.schedule;

        for (name, value) in [
            ("schedule.monitor_interval_secs", s.monitor_interval_secs),
            ("schedule.validation_interval_secs", s.validation_interval_secs),
            ("schedule.log_cleanup_interval_secs", s.log_cleanup_interval_secs),
            ("schedule.backup_interval_secs", s.backup_interval_secs),
            ("runtime.command_timeout_secs", self.runtime.command_timeout_secs),
            ("probes.timeout_secs", self.probes.timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be > 0"));
            }
        }
        if self.probes.timeout_secs > defaults::MAX_PROBE_TIMEOUT_SECS {
            errors.push(format!(
                "probes.timeout_secs must be <= {} (got {})",
                defaults::MAX_PROBE_TIMEOUT_SECS,
                self.probes.timeout_secs
            ));
        }
        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.addr '{}' is not a socket address", self.server.addr));
        }

        let mut seen = HashSet::new();
        for profile in &self.services {
            if !seen.insert(profile.name.as_str()) {
                errors.push(format!("services: duplicate profile '{}'", profile.name));
            }
            for spec in &profile.paths {
                if let Err(e) = spec.expected() {
                    errors.push(format!("services.{}.paths: {e}", profile.name));
                }
            }
            if profile.env_file.is_none()
                && (!profile.required_vars.is_empty() || !profile.base64_vars.is_empty())
            {
                errors.push(format!(
                    "services.{}: variable checks declared without env_file",
                    profile.name
                ));
            }
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                errors.push(format!("entities: duplicate entity '{}'", entity.name));
            }
            if let Some(ref profile) = entity.profile {
                if self.profile(profile).is_none() {
                    errors.push(format!(
                        "entities.{}: unknown profile '{profile}'",
                        entity.name
                    ));
                }
            }
            if let StrategyConfig::Directories { ref paths } = entity.strategy {
                for spec in paths {
                    if let Err(e) = spec.expected() {
                        errors.push(format!("entities.{}.strategy: {e}", entity.name));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

/// Timer periods for the supervision loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_validation_interval")]
    pub validation_interval_secs: u64,
    #[serde(default = "default_log_cleanup_interval")]
    pub log_cleanup_interval_secs: u64,
    #[serde(default = "default_backup_interval")]
    pub backup_interval_secs: u64,
    /// Wait after a restart before checking that the entity came back
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_monitor_interval() -> u64 { defaults::MONITOR_INTERVAL_SECS }
fn default_validation_interval() -> u64 { defaults::VALIDATION_INTERVAL_SECS }
fn default_log_cleanup_interval() -> u64 { defaults::LOG_CLEANUP_INTERVAL_SECS }
fn default_backup_interval() -> u64 { defaults::BACKUP_INTERVAL_SECS }
fn default_settle_delay() -> u64 { defaults::SETTLE_DELAY_SECS }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval(),
            validation_interval_secs: default_validation_interval(),
            log_cleanup_interval_secs: default_log_cleanup_interval(),
            backup_interval_secs: default_backup_interval(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// The supervisor's own container name; skipped during monitoring
    #[serde(default = "default_self_name")]
    pub self_name: String,
    #[serde(default = "default_restart_loop_threshold")]
    pub restart_loop_threshold: u32,
    /// Also supervise listed containers whose names start with this prefix
    #[serde(default)]
    pub discover_prefix: Option<String>,
}

fn default_docker_bin() -> String { defaults::DOCKER_BIN.to_string() }
fn default_command_timeout() -> u64 { defaults::COMMAND_TIMEOUT_SECS }
fn default_self_name() -> String { defaults::SELF_NAME.to_string() }
fn default_restart_loop_threshold() -> u32 { defaults::RESTART_LOOP_THRESHOLD }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_bin: default_docker_bin(),
            command_timeout_secs: default_command_timeout(),
            self_name: default_self_name(),
            restart_loop_threshold: default_restart_loop_threshold(),
            discover_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,
    #[serde(default = "default_backup_root")]
    pub backup_root: PathBuf,
    /// Files or directories copied on every backup tick
    #[serde(default)]
    pub backup_sources: Vec<PathBuf>,
}

fn default_report_dir() -> PathBuf { PathBuf::from(defaults::REPORT_DIR) }
fn default_log_dir() -> PathBuf { PathBuf::from(defaults::LOG_DIR) }
fn default_log_retention_days() -> u64 { defaults::LOG_RETENTION_DAYS }
fn default_backup_root() -> PathBuf { PathBuf::from(defaults::BACKUP_ROOT) }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            log_dir: default_log_dir(),
            log_retention_days: default_log_retention_days(),
            backup_root: default_backup_root(),
            backup_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

fn default_probe_timeout() -> u64 { defaults::PROBE_TIMEOUT_SECS }

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
        }
    }
}

// ============================================================================
// Service Profiles
// ============================================================================

/// The configuration files and checks declared for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub name: String,

    /// Disabled profiles report a single passing result
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `KEY=VALUE` env file
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    #[serde(default)]
    pub required_vars: Vec<String>,

    /// Variable holding the framework secret key (length-checked)
    #[serde(default)]
    pub secret_key_var: Option<String>,

    /// Variable holding the JSON encryption-key list
    #[serde(default)]
    pub encryption_keys_var: Option<String>,

    /// Variables holding standalone base64 keys
    #[serde(default)]
    pub base64_vars: Vec<String>,

    /// Probe the database declared by `DATABASE_*` variables
    #[serde(default)]
    pub probe_database: bool,

    /// Probe the cache declared by `REDIS_*` variables
    #[serde(default)]
    pub probe_cache: bool,

    /// Paths with expected ownership and mode
    #[serde(default)]
    pub paths: Vec<PathSpec>,

    /// Structured documents with required top-level keys
    #[serde(default)]
    pub documents: Vec<DocumentSpec>,

    /// Data files that must exist (created empty when missing)
    #[serde(default)]
    pub data_files: Vec<PathBuf>,

    /// Values used when creating the env file or filling missing/blank keys
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ServiceProfile {
    /// A bare enabled profile, mainly for building configs in code.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            env_file: None,
            required_vars: Vec::new(),
            secret_key_var: None,
            encryption_keys_var: None,
            base64_vars: Vec::new(),
            probe_database: false,
            probe_cache: false,
            paths: Vec::new(),
            documents: Vec::new(),
            data_files: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn path_spec(&self, path: &Path) -> Option<&PathSpec> {
        self.paths.iter().find(|p| p.path == path)
    }

    pub fn document(&self, path: &Path) -> Option<&DocumentSpec> {
        self.documents.iter().find(|d| d.path == path)
    }

    /// Whether `path` is one of the files this profile owns.
    pub fn owns(&self, path: &Path) -> bool {
        self.env_file.as_deref() == Some(path)
            || self.path_spec(path).is_some()
            || self.document(path).is_some()
            || self.data_files.iter().any(|p| p == path)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    File,
    Directory,
}

/// A path whose owner and mode are checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSpec {
    pub path: PathBuf,
    /// Numeric `uid:gid`; defaults to the supervisor's own user
    #[serde(default)]
    pub owner: Option<String>,
    /// Octal mode such as `"0600"`; defaults to 0644 for files, 0755 for directories
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub kind: PathKind,
}

impl PathSpec {
    /// Expected ownership, resolving defaults.
    pub fn expected(&self) -> Result<Ownership, String> {
        let (uid, gid) = match self.owner {
            Some(ref owner) => parse_owner(owner)?,
            None => permissions::current_owner(),
        };
        let mode = match self.mode {
            Some(ref mode) => parse_mode(mode)?,
            None => match self.kind {
                PathKind::File => 0o644,
                PathKind::Directory => 0o755,
            },
        };
        Ok(Ownership { uid, gid, mode })
    }
}

fn parse_owner(owner: &str) -> Result<(u32, u32), String> {
    let (uid, gid) = owner
        .split_once(':')
        .ok_or_else(|| format!("owner '{owner}' must be uid:gid"))?;
    let uid = uid
        .trim()
        .parse()
        .map_err(|_| format!("owner '{owner}': uid is not numeric"))?;
    let gid = gid
        .trim()
        .parse()
        .map_err(|_| format!("owner '{owner}': gid is not numeric"))?;
    Ok((uid, gid))
}

fn parse_mode(mode: &str) -> Result<u32, String> {
    let digits = mode.trim().trim_start_matches("0o");
    let value = u32::from_str_radix(digits, 8).map_err(|_| format!("mode '{mode}' is not octal"))?;
    if value > 0o7777 {
        return Err(format!("mode '{mode}' is out of range"));
    }
    Ok(value)
}

/// A JSON/YAML document with required top-level keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSpec {
    pub path: PathBuf,
    pub format: DocumentFormat,
    #[serde(default)]
    pub required_keys: Vec<String>,
    /// Value written when the document is created, and the source of
    /// missing keys when it is repaired
    #[serde(default)]
    pub template: Option<serde_json::Value>,
}

// ============================================================================
// Entities
// ============================================================================

/// A supervised entity (container) and how to heal it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Service profile validated before every restart
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    RestartOnly,
    /// Make sure directories exist with the right ownership and mode
    Directories { paths: Vec<PathSpec> },
    /// Make sure a TCP dependency accepts connections
    Dependency { host: String, port: u16 },
}
