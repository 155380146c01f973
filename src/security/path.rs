//! Path validation pipeline.
//!
//! Every filesystem path handed to this crate by configuration or callers is
//! untrusted. Validation runs a fixed sequence of stages, each a pure
//! `ValidationState -> ValidationState` step, short-circuiting on the first
//! failure. Once a state is failed no later stage can flip it back.
//!
//! Stage order:
//! 1. empty / byte-length bound (runs first to bound all downstream work)
//! 2. null bytes
//! 3. control characters (raw)
//! 4. invisible / zero-width Unicode (raw)
//! 5. NFC normalization, then control/invisible re-check
//! 6. traversal segments (`..`)
//! 7. tilde expansion (bare `~` only, never `~user`)
//! 8. absolutization against the base dir + structural normalization
//! 9. post-normalization re-checks (surviving `..`, double separators,
//!    home-boundary for tilde paths, length re-check)
//! 10. optional symlink resolution with boundary re-check
//! 11. optional existence check (last: existence is functional, not security)

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use super::permissions::KeyFileChecker;

/// Maximum accepted path length in bytes, matching POSIX `PATH_MAX`.
pub const MAX_PATH_BYTES: usize = 4096;

/// Options controlling the optional tail stages of validation.
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    /// Resolve symlinks and re-validate the resolved target.
    pub resolve_symlinks: bool,

    /// Fail if the path does not exist (checked last).
    pub require_exists: bool,

    /// Base for relative paths and boundary for resolved symlink targets.
    /// Defaults to the process working directory.
    pub base_dir: Option<PathBuf>,
}

/// Outcome of path validation.
///
/// If `valid` is true, `normalized` holds an absolute, traversal-free,
/// length-bounded path. Warnings are non-fatal findings (e.g. weak key-file
/// permissions) the caller may surface or log.
#[derive(Debug, Clone)]
pub struct PathCheck {
    pub valid: bool,
    pub original: String,
    pub normalized: Option<PathBuf>,
    pub reason: Option<String>,
    pub symlinks_resolved: bool,
    pub warnings: Vec<String>,
}

impl PathCheck {
    fn rejected(original: &str, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            original: original.to_string(),
            normalized: None,
            reason: Some(reason.into()),
            symlinks_resolved: false,
            warnings: Vec::new(),
        }
    }
}

/// Mutable record threaded through the string stages. Failure is a one-way
/// latch: every stage passes a failed state through untouched.
#[derive(Debug, Clone)]
struct ValidationState {
    valid: bool,
    value: String,
    reason: Option<String>,
    started_with_tilde: bool,
}

impl ValidationState {
    fn new(value: &str) -> Self {
        Self {
            valid: true,
            value: value.to_string(),
            reason: None,
            started_with_tilde: false,
        }
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        self.valid = false;
        self.reason = Some(reason.into());
        self
    }
}

/// Characters with no visual width that can disguise a path on screen.
const INVISIBLE_CHARS: &[char] = &[
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
    '\u{200E}', // LRM
    '\u{200F}', // RLM
    '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}', '\u{202E}', // bidi embedding
    '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', // bidi isolates
];

pub(crate) fn has_control_chars(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_control())
}

pub(crate) fn has_invisible_chars(s: &str) -> bool {
    s.chars().any(|c| INVISIBLE_CHARS.contains(&c))
}

/// Validates untrusted filesystem paths.
#[derive(Debug, Default)]
pub struct PathValidator {
    key_checker: KeyFileChecker,
}

impl PathValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full validation pipeline on `raw`.
    pub fn validate(&self, raw: &str, options: &PathOptions) -> PathCheck {
        let mut state = ValidationState::new(raw);

        let stages: &[fn(&Self, ValidationState) -> ValidationState] = &[
            Self::check_length,
            Self::check_null_bytes,
            Self::check_control_chars,
            Self::check_invisible_chars,
            Self::normalize_unicode,
            Self::check_traversal,
            Self::expand_tilde,
        ];

        for stage in stages {
            state = stage(self, state);
            if !state.valid {
                return PathCheck::rejected(raw, state.reason.unwrap_or_default());
            }
        }

        self.finish(raw, state, options)
    }

    /// Validate a submodule path: must be relative, is joined under the
    /// workspace root, and the workspace boundary is enforced both before and
    /// after symlink resolution (a submodule symlink may legitimately point
    /// outside until resolved, at which point it must not).
    pub fn validate_submodule_path(&self, relative: &str, workspace_root: &Path) -> PathCheck {
        if Path::new(relative).is_absolute() {
            return PathCheck::rejected(relative, "submodule path must be relative");
        }

        // Lexical boundary first: the joined path must already sit under the
        // workspace before any symlink following happens.
        let lexical = self.validate(
            relative,
            &PathOptions {
                resolve_symlinks: false,
                require_exists: false,
                base_dir: Some(workspace_root.to_path_buf()),
            },
        );
        if !lexical.valid {
            return lexical;
        }
        if let Some(ref joined) = lexical.normalized {
            if !joined.starts_with(workspace_root) {
                return PathCheck::rejected(relative, "submodule path escapes the workspace root");
            }
        }

        // Then the resolved-target boundary, enforced during resolution.
        self.validate(
            relative,
            &PathOptions {
                resolve_symlinks: true,
                require_exists: false,
                base_dir: Some(workspace_root.to_path_buf()),
            },
        )
    }

    /// Validate an SSH private key path. Symlinks are always resolved and the
    /// key file's permission bits are audited; weak permissions are carried as
    /// warnings, not failures.
    pub fn validate_ssh_key_path(&self, raw: &str) -> PathCheck {
        let options = PathOptions {
            resolve_symlinks: true,
            require_exists: false,
            base_dir: None,
        };
        let mut check = self.validate(raw, &options);
        if check.valid {
            if let Some(ref path) = check.normalized {
                if let Some(warning) = self.key_checker.audit(path) {
                    check.warnings.push(warning);
                }
            }
        }
        check
    }

    // --- string stages -----------------------------------------------------

    fn check_length(&self, state: ValidationState) -> ValidationState {
        if state.value.is_empty() {
            return state.fail("empty path");
        }
        if state.value.len() > MAX_PATH_BYTES {
            let reason = format!("path exceeds {MAX_PATH_BYTES} bytes ({})", state.value.len());
            return state.fail(reason);
        }
        state
    }

    fn check_null_bytes(&self, state: ValidationState) -> ValidationState {
        if state.value.contains('\0') {
            return state.fail("path contains a null byte");
        }
        state
    }

    fn check_control_chars(&self, state: ValidationState) -> ValidationState {
        if has_control_chars(&state.value) {
            return state.fail("path contains control characters");
        }
        state
    }

    fn check_invisible_chars(&self, state: ValidationState) -> ValidationState {
        if has_invisible_chars(&state.value) {
            return state.fail("path contains invisible Unicode characters");
        }
        state
    }

    /// NFC-normalize, then re-run the character checks: normalization can
    /// introduce characters that were not present in the raw input.
    fn normalize_unicode(&self, mut state: ValidationState) -> ValidationState {
        state.value = state.value.nfc().collect();
        if has_control_chars(&state.value) {
            return state.fail("path contains control characters after normalization");
        }
        if has_invisible_chars(&state.value) {
            return state.fail("path contains invisible characters after normalization");
        }
        state
    }

    /// Any `..` segment is rejected outright, before and independent of
    /// normalization. Lexical collapsing of `..` is exactly the kind of
    /// "helpful" transformation that turns a traversal string into a valid
    /// path, so it never happens here.
    fn check_traversal(&self, state: ValidationState) -> ValidationState {
        let has_dotdot = Path::new(&state.value)
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        // Also catch Windows-style separators that Path does not split on Unix.
        if has_dotdot || state.value.contains("..\\") || state.value.contains("\\..") {
            return state.fail("path contains a parent-directory traversal segment");
        }
        state
    }

    /// Expand a bare `~` or `~/` prefix against the current user's home.
    /// `~user` is rejected rather than resolved: expanding into another
    /// user's home directory is never intended here.
    fn expand_tilde(&self, mut state: ValidationState) -> ValidationState {
        if !state.value.starts_with('~') {
            return state;
        }
        if state.value != "~" && !state.value.starts_with("~/") {
            return state.fail("tilde expansion is only supported for the current user");
        }
        let Some(home) = dirs::home_dir() else {
            return state.fail("cannot expand '~': home directory unknown");
        };
        let rest = state.value.trim_start_matches('~').trim_start_matches('/');
        let expanded = if rest.is_empty() { home } else { home.join(rest) };
        state.value = expanded.to_string_lossy().into_owned();
        state.started_with_tilde = true;
        state
    }

    // --- structural stages -------------------------------------------------

    fn finish(&self, raw: &str, state: ValidationState, options: &PathOptions) -> PathCheck {
        let base = options
            .base_dir
            .clone()
            .or_else(|| std::env::current_dir().ok());
        let Some(base) = base else {
            return PathCheck::rejected(raw, "no base directory available");
        };

        let candidate = Path::new(&state.value);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        };

        // Collapse `.` segments and repeated separators. `..` was already
        // rejected, so this is purely cosmetic normalization.
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        // Normalization bugs must not silently produce an escape.
        if normalized
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return PathCheck::rejected(raw, "traversal segment survived normalization");
        }
        let normalized_str = normalized.to_string_lossy().into_owned();
        if normalized_str.contains("//") {
            return PathCheck::rejected(raw, "double separators survived normalization");
        }
        if state.started_with_tilde {
            if let Some(home) = dirs::home_dir() {
                if !normalized.starts_with(&home) {
                    return PathCheck::rejected(raw, "tilde path escaped the home directory");
                }
            }
        }
        // Normalization can lengthen relative paths; re-apply the bound.
        if normalized_str.len() > MAX_PATH_BYTES {
            return PathCheck::rejected(raw, "normalized path exceeds the length bound");
        }

        let mut symlinks_resolved = false;
        let mut final_path = normalized;

        if options.resolve_symlinks {
            // `symlink_metadata` does not follow the link, so it tells us
            // whether an entry is present at all. An absent entry is the only
            // benign skip; once something exists here, resolution must
            // succeed. Relying on `exists()` instead would silently wave
            // through loops and dangling links, since it reports `false` for
            // any metadata error.
            match std::fs::symlink_metadata(&final_path) {
                Ok(_) => match std::fs::canonicalize(&final_path) {
                    Ok(resolved) => {
                        let resolved_str = resolved.to_string_lossy();
                        if has_control_chars(&resolved_str) {
                            return PathCheck::rejected(
                                raw,
                                "symlink target contains control characters",
                            );
                        }
                        if has_invisible_chars(&resolved_str) {
                            return PathCheck::rejected(
                                raw,
                                "symlink target contains invisible characters",
                            );
                        }
                        if let Some(ref boundary) = options.base_dir {
                            if !resolved.starts_with(boundary) {
                                return PathCheck::rejected(
                                    raw,
                                    "symlink target escapes the declared boundary",
                                );
                            }
                        }
                        final_path = resolved;
                        symlinks_resolved = true;
                    }
                    // ELOOP and dangling links surface here. A link that
                    // exists but cannot be resolved is a security failure,
                    // not a missing file.
                    Err(err) => {
                        return PathCheck::rejected(
                            raw,
                            format!("symlink resolution failed: {}", err.kind()),
                        );
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return PathCheck::rejected(
                        raw,
                        format!("cannot inspect path: {}", err.kind()),
                    );
                }
            }
        }

        if options.require_exists && !final_path.exists() {
            return PathCheck::rejected(raw, "path does not exist");
        }

        PathCheck {
            valid: true,
            original: raw.to_string(),
            normalized: Some(final_path),
            reason: None,
            symlinks_resolved,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn validate(raw: &str) -> PathCheck {
        PathValidator::new().validate(raw, &PathOptions::default())
    }

    #[test]
    fn test_accepts_plain_absolute_path() {
        let check = validate("/tmp/some/file.txt");
        assert!(check.valid, "{:?}", check.reason);
        assert_eq!(check.normalized.unwrap(), PathBuf::from("/tmp/some/file.txt"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(!validate("").valid);
    }

    #[test]
    fn test_rejects_over_length_before_filesystem_work() {
        let long = "/".to_string() + &"a".repeat(5000);
        let check = validate(&long);
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("exceeds"));
    }

    #[test]
    fn test_rejects_null_byte_anywhere() {
        assert!(!validate("/tmp/fi\0le").valid);
        assert!(!validate("\0/tmp/file").valid);
        assert!(!validate("/tmp/file\0").valid);
    }

    #[test]
    fn test_rejects_control_characters() {
        assert!(!validate("/tmp/fi\x07le").valid);
        assert!(!validate("/tmp/\x1b[31mfile").valid);
        assert!(!validate("/tmp/fi\x7fle").valid);
    }

    #[test]
    fn test_rejects_invisible_unicode() {
        assert!(!validate("/tmp/fi\u{200B}le").valid);
        assert!(!validate("/tmp/\u{FEFF}file").valid);
        assert!(!validate("/tmp/fi\u{202E}le").valid);
        assert!(!validate("/tmp/fi\u{00AD}le").valid);
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(!validate("/home/user/../../../etc/passwd").valid);
        assert!(!validate("../outside").valid);
        assert!(!validate("/tmp/a/../b").valid);
        assert!(!validate("a\\..\\b").valid);
    }

    #[test]
    fn test_collapses_cur_dir_segments() {
        let check = validate("/tmp/./a/./b");
        assert!(check.valid);
        assert_eq!(check.normalized.unwrap(), PathBuf::from("/tmp/a/b"));
    }

    #[test]
    fn test_relative_resolved_against_base_dir() {
        let options = PathOptions {
            base_dir: Some(PathBuf::from("/srv/work")),
            ..Default::default()
        };
        let check = PathValidator::new().validate("sub/file", &options);
        assert!(check.valid);
        assert_eq!(check.normalized.unwrap(), PathBuf::from("/srv/work/sub/file"));
    }

    #[test]
    fn test_bare_tilde_expansion() {
        let home = dirs::home_dir().unwrap();
        let check = validate("~/keys/id_ed25519");
        assert!(check.valid, "{:?}", check.reason);
        assert_eq!(check.normalized.unwrap(), home.join("keys/id_ed25519"));
    }

    #[test]
    fn test_rejects_tilde_user() {
        let check = validate("~root/.ssh/id_rsa");
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("tilde"));
    }

    #[test]
    fn test_nonexistent_path_is_valid_without_require_exists() {
        let check = validate("/tmp/definitely/not/created/here");
        assert!(check.valid);
    }

    #[test]
    fn test_require_exists() {
        let options = PathOptions {
            require_exists: true,
            ..Default::default()
        };
        let check = PathValidator::new().validate("/tmp/definitely/not/created/here", &options);
        assert!(!check.valid);
        assert_eq!(check.reason.unwrap(), "path does not exist");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let first = validate("/tmp/./x//y");
        assert!(first.valid);
        let normalized = first.normalized.unwrap();
        let second = validate(&normalized.to_string_lossy());
        assert!(second.valid);
        assert_eq!(second.normalized.unwrap(), normalized);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_rejected() {
        let boundary = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let target = outside.path().join("secret");
        std::fs::write(&target, b"x").unwrap();
        let link = boundary.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let options = PathOptions {
            resolve_symlinks: true,
            require_exists: false,
            base_dir: Some(boundary.path().canonicalize().unwrap()),
        };
        let check = PathValidator::new().validate(&link.to_string_lossy(), &options);
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("boundary"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_boundary_is_resolved() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let target = root.join("real");
        std::fs::write(&target, b"x").unwrap();
        let link = root.join("alias");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let options = PathOptions {
            resolve_symlinks: true,
            require_exists: true,
            base_dir: Some(root.clone()),
        };
        let check = PathValidator::new().validate(&link.to_string_lossy(), &options);
        assert!(check.valid, "{:?}", check.reason);
        assert!(check.symlinks_resolved);
        assert_eq!(check.normalized.unwrap(), target);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_rejected_not_skipped() {
        let boundary = tempdir().unwrap();
        let link = boundary.path().join("dangling");
        std::os::unix::fs::symlink("/nonexistent/outside/secret", &link).unwrap();

        let options = PathOptions {
            resolve_symlinks: true,
            require_exists: false,
            base_dir: Some(boundary.path().canonicalize().unwrap()),
        };
        let check = PathValidator::new().validate(&link.to_string_lossy(), &options);
        // The link exists, so resolution must run and fail; the boundary
        // check is never silently skipped.
        assert!(!check.valid);
        assert!(!check.symlinks_resolved);
        assert!(check.reason.unwrap().contains("symlink resolution failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_a_failure() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::os::unix::fs::symlink(&a, &b).unwrap();
        std::os::unix::fs::symlink(&b, &a).unwrap();

        let options = PathOptions {
            resolve_symlinks: true,
            require_exists: false,
            base_dir: Some(dir.path().to_path_buf()),
        };
        let check = PathValidator::new().validate(&a.to_string_lossy(), &options);
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("symlink resolution failed"));
    }

    #[test]
    fn test_submodule_path_must_be_relative() {
        let validator = PathValidator::new();
        let check = validator.validate_submodule_path("/etc", Path::new("/srv/repo"));
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("relative"));
    }

    #[test]
    fn test_submodule_path_joined_under_workspace() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let validator = PathValidator::new();
        let check = validator.validate_submodule_path("vendored/lib", &root);
        assert!(check.valid, "{:?}", check.reason);
        assert_eq!(check.normalized.unwrap(), root.join("vendored/lib"));
    }

    #[test]
    fn test_submodule_traversal_rejected() {
        let validator = PathValidator::new();
        let check = validator.validate_submodule_path("../sibling", Path::new("/srv/repo"));
        assert!(!check.valid);
    }

    #[cfg(unix)]
    #[test]
    fn test_submodule_symlink_within_workspace_resolves() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let real = root.join("real");
        std::fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, root.join("alias")).unwrap();

        let validator = PathValidator::new();
        let check = validator.validate_submodule_path("alias", &root);
        assert!(check.valid, "{:?}", check.reason);
        assert!(check.symlinks_resolved);
        assert_eq!(check.normalized.unwrap(), real);
    }

    #[cfg(unix)]
    #[test]
    fn test_submodule_symlink_escaping_workspace_rejected() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("sneaky")).unwrap();

        let validator = PathValidator::new();
        let check = validator.validate_submodule_path("sneaky", &root);
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("boundary"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ssh_key_path_weak_permissions_warn() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, b"key material").unwrap();
        std::fs::set_permissions(&key, std::fs::Permissions::from_mode(0o644)).unwrap();

        let check = PathValidator::new().validate_ssh_key_path(&key.to_string_lossy());
        assert!(check.valid, "{:?}", check.reason);
        assert!(!check.warnings.is_empty());
    }
}
