//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Health listener bind address.
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8090";

// ============================================================================
// Schedule
// ============================================================================

/// Entity monitoring tick (seconds).
pub const MONITOR_INTERVAL_SECS: u64 = 30;

/// Full configuration re-validation (seconds). 1 800 = 30 min.
pub const VALIDATION_INTERVAL_SECS: u64 = 1_800;

/// Log cleanup sweep (seconds). 3 600 = 1 hour.
pub const LOG_CLEANUP_INTERVAL_SECS: u64 = 3_600;

/// Configuration snapshot (seconds). 21 600 = 6 hours.
pub const BACKUP_INTERVAL_SECS: u64 = 21_600;

/// Wait after a restart before re-inspecting the entity (seconds).
pub const SETTLE_DELAY_SECS: u64 = 10;

// ============================================================================
// Runtime
// ============================================================================

pub const DOCKER_BIN: &str = "docker";

/// Bound on any external command (seconds). A timeout counts as failure.
pub const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Runtime restart count above which a restarting/exited entity is in a loop.
pub const RESTART_LOOP_THRESHOLD: u32 = 3;

/// Name of the supervisor's own container; never acted on.
pub const SELF_NAME: &str = "fleet-healer";

/// Log lines fetched when an entity is degraded.
pub const LOG_TAIL_LINES: u32 = 50;

// ============================================================================
// Paths
// ============================================================================

pub const REPORT_DIR: &str = "/var/log/fleet-healer/reports";
pub const LOG_DIR: &str = "/var/log/fleet-healer";
pub const BACKUP_ROOT: &str = "/var/backups/fleet-healer";

/// Age after which `*.log` files are removed (days).
pub const LOG_RETENTION_DAYS: u64 = 7;

// ============================================================================
// Probes
// ============================================================================

/// Dependency probe timeout (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Upper bound accepted for the probe timeout (seconds).
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_DATABASE_PORT: u16 = 5432;
pub const DEFAULT_CACHE_PORT: u16 = 6379;

// ============================================================================
// Validation & Repair
// ============================================================================

/// Minimum decoded length for base64 key material (bytes).
pub const MIN_KEY_BYTES: usize = 16;

/// Minimum length for a framework secret key (characters).
pub const MIN_SECRET_KEY_LEN: usize = 50;

/// Length of freshly generated base64 keys before encoding (bytes).
pub const GENERATED_KEY_BYTES: usize = 32;

/// Length of freshly generated secret keys (characters).
pub const GENERATED_SECRET_LEN: usize = 64;

/// Cipher written into generated encryption-key entries.
pub const ENCRYPTION_CIPHER: &str = "AES-GCM";

/// Env variable holding the id of the active encryption key.
pub const DEFAULT_KEY_ID_VAR: &str = "DEFAULT_ENCRYPTION_KEY_ID";

/// Comment placed above variables appended by repair.
pub const APPENDED_VARS_HEADER: &str = "Added by auto-repair";
