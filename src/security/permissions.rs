//! Key-file permission auditing.
//!
//! SSH private keys are expected to be readable by their owner only. A key
//! that is group- or world-readable still works, so weak permissions are
//! reported as warnings rather than validation failures; the caller decides
//! whether to surface or merely log them.

use std::path::Path;

/// Audits permission bits on SSH key files.
#[derive(Debug, Default)]
pub struct KeyFileChecker;

impl KeyFileChecker {
    pub fn new() -> Self {
        Self
    }

    /// Return a warning describing weak permissions, or `None` if the file is
    /// absent, unreadable, or acceptably locked down. Missing files are not a
    /// permission problem.
    #[cfg(unix)]
    pub fn audit(&self, path: &Path) -> Option<String> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let mode = metadata.permissions().mode() & 0o777;

        if mode & 0o004 != 0 {
            return Some(format!(
                "key file '{}' is world-readable (mode {:o})",
                path.display(),
                mode
            ));
        }
        if mode & 0o040 != 0 {
            return Some(format!(
                "key file '{}' is group-readable (mode {:o})",
                path.display(),
                mode
            ));
        }
        None
    }

    #[cfg(not(unix))]
    pub fn audit(&self, _path: &Path) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_not_flagged() {
        let checker = KeyFileChecker::new();
        assert!(checker.audit(Path::new("/nonexistent/id_rsa")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_key_passes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        File::create(&key).unwrap();
        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o600)).unwrap();

        assert!(KeyFileChecker::new().audit(&key).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_world_readable_key_is_flagged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        File::create(&key).unwrap();
        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o644)).unwrap();

        let warning = KeyFileChecker::new().audit(&key).unwrap();
        assert!(warning.contains("world-readable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_group_readable_key_is_flagged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        File::create(&key).unwrap();
        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o640)).unwrap();

        let warning = KeyFileChecker::new().audit(&key).unwrap();
        assert!(warning.contains("group-readable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_is_ignored() {
        let dir = tempdir().unwrap();
        assert!(KeyFileChecker::new().audit(dir.path()).is_none());
    }
}
