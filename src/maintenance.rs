//! Housekeeping timers: log retention and configuration snapshots.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::PathsConfig;
use crate::store::backup;

/// Delete `*.log` files under `dir` (recursively) last modified more than
/// `retention` before `now`. Returns how many were removed.
pub fn cleanup_logs(dir: &Path, retention: Duration, now: SystemTime) -> std::io::Result<usize> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Log directory missing, nothing to clean");
        return Ok(0);
    }
    let Some(cutoff) = now.checked_sub(retention) else {
        return Ok(0);
    };
    let mut removed = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if modified < cutoff {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Could not remove old log"),
                }
            }
        }
    }
    Ok(removed)
}

/// Log cleanup tick.
pub fn run_log_cleanup(paths: &PathsConfig) {
    let retention = Duration::from_secs(paths.log_retention_days * 24 * 3_600);
    match cleanup_logs(&paths.log_dir, retention, SystemTime::now()) {
        Ok(removed) => info!(removed, dir = %paths.log_dir.display(), "Log cleanup completed"),
        Err(e) => warn!(dir = %paths.log_dir.display(), error = %e, "Log cleanup failed"),
    }
}

/// Configuration backup tick.
pub fn run_backup(paths: &PathsConfig, now: DateTime<Utc>) -> Option<PathBuf> {
    if paths.backup_sources.is_empty() {
        debug!("No backup sources configured");
        return None;
    }
    match backup::snapshot_sources(&paths.backup_root, &paths.backup_sources, now) {
        Ok(dest) => {
            info!(dest = %dest.display(), sources = paths.backup_sources.len(), "Configuration backup completed");
            Some(dest)
        }
        Err(e) => {
            warn!(root = %paths.backup_root.display(), error = %e, "Configuration backup failed");
            None
        }
    }
}
