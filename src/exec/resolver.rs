//! Binary resolution.
//!
//! Logical command names are mapped to verified absolute paths exactly once
//! per process lifetime. A malicious executable planted earlier in `PATH`
//! only wins if it survives verification *and* the search itself; resolution
//! happens in-process (no lookup subprocess exists to be polluted), the
//! candidate must be a regular file with an execute bit, and both successful
//! and failed resolutions are cached until explicitly invalidated.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::security::CommandAllowlist;

#[derive(Debug, Error)]
pub enum BinaryResolutionError {
    #[error("command '{0}' is not allowlisted")]
    NotAllowlisted(String),

    #[error("binary for '{0}' not found")]
    NotFound(String),

    #[error("'{0}' is not a regular file")]
    NotARegularFile(PathBuf),

    #[error("'{0}' is not executable")]
    NotExecutable(PathBuf),
}

type LookupFn = dyn Fn(&str) -> Option<PathBuf> + Send + Sync;

/// Maps logical command names to verified absolute paths, with a
/// per-process cache.
pub struct BinaryResolver {
    /// Explicitly configured git path; takes priority when it verifies.
    configured_git_path: Option<PathBuf>,
    /// `command -> Some(path)` on success, `None` sentinel on failure.
    cache: Mutex<HashMap<String, Option<PathBuf>>>,
    lookup: Box<LookupFn>,
}

impl fmt::Debug for BinaryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryResolver")
            .field("configured_git_path", &self.configured_git_path)
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

impl BinaryResolver {
    pub fn new(configured_git_path: Option<PathBuf>) -> Self {
        Self {
            configured_git_path,
            cache: Mutex::new(HashMap::new()),
            lookup: Box::new(|command| which::which(command).ok()),
        }
    }

    /// Replace the lookup function. Used by tests to observe cache behavior
    /// without touching the real `PATH`.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    /// Resolve `command` to a verified absolute path. O(1) after the first
    /// call per command; failures are cached too.
    pub fn get_binary_path(&self, command: &str) -> Result<PathBuf, BinaryResolutionError> {
        if CommandAllowlist::entry(command).is_none() {
            return Err(BinaryResolutionError::NotAllowlisted(command.to_string()));
        }

        if let Some(cached) = self.cache.lock().get(command) {
            return cached
                .clone()
                .ok_or_else(|| BinaryResolutionError::NotFound(command.to_string()));
        }

        let resolved = self.resolve_uncached(command);
        // Last-write-wins: concurrent racers resolve to equivalent values.
        self.cache
            .lock()
            .insert(command.to_string(), resolved.as_ref().ok().cloned());
        resolved
    }

    fn resolve_uncached(&self, command: &str) -> Result<PathBuf, BinaryResolutionError> {
        if command == "git" {
            if let Some(ref configured) = self.configured_git_path {
                if let Ok(path) = verify_candidate(configured) {
                    return Ok(path);
                }
                tracing::warn!(
                    target: "gitswitch::exec",
                    path = %configured.display(),
                    "configured git path failed verification, falling back to lookup"
                );
            }
        }

        let candidate =
            (self.lookup)(command).ok_or_else(|| BinaryResolutionError::NotFound(command.to_string()))?;
        verify_candidate(&candidate)
    }

    /// Drop all cached resolutions, e.g. after a configuration change.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn invalidate_command(&self, command: &str) {
        self.cache.lock().remove(command);
    }
}

/// A candidate must be a regular file and, outside Windows, carry at least
/// one execute bit.
fn verify_candidate(path: &Path) -> Result<PathBuf, BinaryResolutionError> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| BinaryResolutionError::NotFound(path.display().to_string()))?;
    if !metadata.is_file() {
        return Err(BinaryResolutionError::NotARegularFile(path.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(BinaryResolutionError::NotExecutable(path.to_path_buf()));
        }
    }
    Ok(path.to_path_buf())
}
