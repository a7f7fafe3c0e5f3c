//! Timestamped copies taken before a repair mutates a file, plus the
//! periodic configuration snapshot.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Copy `path` to `<name>.bak.<YYYYmmdd-HHMMSS>` next to it.
///
/// Returns `Ok(None)` when there is nothing to back up. A numeric suffix is
/// added if a backup with the same timestamp already exists.
pub fn backup_file(path: &Path, now: DateTime<Utc>) -> std::io::Result<Option<PathBuf>> {
    if !path.is_file() {
        return Ok(None);
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = format!("{file_name}.bak.{}", now.format("%Y%m%d-%H%M%S"));

    let mut candidate = dir.join(&stem);
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}.{n}"));
        n += 1;
    }

    fs::copy(path, &candidate)?;
    info!(backup = %candidate.display(), "Created config backup");
    Ok(Some(candidate))
}

/// Copy each existing source (file or directory tree) into
/// `<root>/<YYYYmmdd_HHMMSS>/`. Returns the snapshot directory.
///
/// A source that fails to copy is logged and skipped.
pub fn snapshot_sources(
    root: &Path,
    sources: &[PathBuf],
    now: DateTime<Utc>,
) -> std::io::Result<PathBuf> {
    let dest = root.join(now.format("%Y%m%d_%H%M%S").to_string());
    fs::create_dir_all(&dest)?;

    for source in sources {
        if !source.exists() {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = dest.join(name);
        let copied = if source.is_dir() {
            copy_tree(source, &target)
        } else {
            fs::copy(source, &target).map(|_| ())
        };
        if let Err(e) = copied {
            warn!(source = %source.display(), error = %e, "Failed to back up config source");
        }
    }

    Ok(dest)
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_of_missing_file_is_none() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let result = backup_file(&tmp.path().join("absent.env"), Utc::now()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn same_second_backups_do_not_collide() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("app.env");
        fs::write(&file, "A=1\n").unwrap();
        let now = Utc::now();

        let first = backup_file(&file, now).unwrap().unwrap();
        let second = backup_file(&file, now).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(second).unwrap(), "A=1\n");
    }

    #[test]
    fn snapshot_copies_files_and_trees() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let conf = tmp.path().join("conf");
        fs::create_dir_all(conf.join("nested")).unwrap();
        fs::write(conf.join("nested/a.yaml"), "a: 1\n").unwrap();
        let compose = tmp.path().join("compose.yml");
        fs::write(&compose, "services: {}\n").unwrap();

        let root = tmp.path().join("backups");
        let dest = snapshot_sources(
            &root,
            &[conf, compose, tmp.path().join("missing")],
            Utc::now(),
        )
        .unwrap();

        assert!(dest.join("conf/nested/a.yaml").is_file());
        assert!(dest.join("compose.yml").is_file());
        assert!(!dest.join("missing").exists());
    }
}
