//! Ownership and permission bits on disk.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::validation::Ownership;

/// uid/gid of the running process.
#[allow(unsafe_code)]
pub fn current_owner() -> (u32, u32) {
    // SAFETY: getuid/getgid take no arguments and cannot fail
    unsafe { (libc::getuid(), libc::getgid()) }
}

/// Current owner and permission bits (`mode & 0o7777`, so setgid and sticky
/// bits are kept) of `path`.
pub fn inspect(path: &Path) -> std::io::Result<Ownership> {
    let meta = fs::metadata(path)?;
    Ok(Ownership {
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode() & 0o7777,
    })
}

/// Bring `path` to the expected owner and mode. Returns whether anything changed.
pub fn apply(path: &Path, expected: Ownership) -> std::io::Result<bool> {
    let current = inspect(path)?;
    let mut changed = false;
    if current.uid != expected.uid || current.gid != expected.gid {
        std::os::unix::fs::chown(path, Some(expected.uid), Some(expected.gid))?;
        changed = true;
    }
    if current.mode != expected.mode {
        fs::set_permissions(path, fs::Permissions::from_mode(expected.mode))?;
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_mode_once() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("secret.env");
        fs::write(&file, "A=1\n").unwrap();
        let (uid, gid) = current_owner();
        let expected = Ownership { uid, gid, mode: 0o600 };

        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(apply(&file, expected).unwrap());
        assert_eq!(inspect(&file).unwrap(), expected);
        assert!(!apply(&file, expected).unwrap());
    }

    #[test]
    fn apply_keeps_setgid_on_shared_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("shared");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o775)).unwrap();
        let (uid, gid) = current_owner();
        let expected = Ownership { uid, gid, mode: 0o2775 };

        assert_eq!(inspect(&dir).unwrap().mode, 0o775);
        assert!(apply(&dir, expected).unwrap());
        assert_eq!(inspect(&dir).unwrap(), expected);
        assert!(!apply(&dir, expected).unwrap());
    }
}
