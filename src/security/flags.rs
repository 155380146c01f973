//! Command-line flag validation.
//!
//! Flags are validated against a closed world: a short flag must be a member
//! of the command's allowed set, and a combined short flag (`-lf`) must match
//! an explicitly registered per-command pattern. Unknown combinations are
//! never inferred to be safe, even when every individual character would be
//! allowed on its own.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

use super::path::{has_control_chars, has_invisible_chars};

/// Maximum characters after the dash in a short flag token.
pub const MAX_SHORT_FLAG_CHARS: usize = 8;

/// Maximum characters after the dash in a combined flag.
pub const MAX_COMBINED_FLAG_CHARS: usize = 4;

/// Combined short-flag patterns, registered per command as exact strings.
/// Anything not listed here is rejected.
static COMBINED_FLAG_PATTERNS: Lazy<HashMap<&'static str, HashSet<&'static str>>> =
    Lazy::new(|| {
        let mut map = HashMap::new();
        map.insert("ssh-keygen", HashSet::from(["-lf"]));
        map.insert("ssh-add", HashSet::new());
        map.insert("git", HashSet::new());
        map
    });

/// Outcome of a flag check. Never an error: rejection is a value.
#[derive(Debug, Clone)]
pub struct FlagCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl FlagCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Validates individual command-line flag tokens.
#[derive(Debug, Default)]
pub struct FlagValidator;

impl FlagValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single argument token for `command` against `allowed`.
    ///
    /// Non-dash tokens and `--long-options` pass through after the character
    /// checks; the caller matches those by exact string. Short flags are fully
    /// decided here.
    pub fn validate_flag(&self, flag: &str, command: &str, allowed: &HashSet<&str>) -> FlagCheck {
        if flag.is_empty() {
            return FlagCheck::rejected("empty argument");
        }
        if flag != flag.trim() {
            return FlagCheck::rejected("argument has leading or trailing whitespace");
        }
        if flag.contains('\0') {
            return FlagCheck::rejected("argument contains a null byte");
        }
        if has_control_chars(flag) {
            return FlagCheck::rejected("argument contains control characters");
        }
        if has_invisible_chars(flag) {
            return FlagCheck::rejected("argument contains invisible Unicode characters");
        }
        // Normalization must never launder a rejected character back in.
        let normalized: String = flag.nfc().collect();
        if has_control_chars(&normalized) || has_invisible_chars(&normalized) {
            return FlagCheck::rejected("argument contains hidden characters after normalization");
        }

        // Positional arguments and long options are matched by the caller.
        if !flag.starts_with('-') || flag.starts_with("--") {
            return FlagCheck::ok();
        }

        let body = &flag[1..];
        if body.is_empty() {
            return FlagCheck::rejected("bare dash is not a valid flag");
        }
        if body.chars().count() > MAX_SHORT_FLAG_CHARS {
            return FlagCheck::rejected("short flag is too long");
        }
        // Blocks flag+value concatenation smuggling such as `-f/etc/passwd`.
        if flag.contains('/') || flag.contains('~') || flag.contains("./") {
            return FlagCheck::rejected("flag contains path characters");
        }
        if !body.chars().all(|c| c.is_ascii_alphabetic()) {
            return FlagCheck::rejected("short flag contains non-alphabetic characters");
        }

        if body.chars().count() == 1 {
            if allowed.contains(flag) {
                FlagCheck::ok()
            } else {
                FlagCheck::rejected(format!("flag '{flag}' is not allowed for '{command}'"))
            }
        } else {
            self.validate_combined_flags(flag, command)
        }
    }

    /// Validate a multi-character short flag such as `-lf`.
    pub fn validate_combined_flags(&self, flag: &str, command: &str) -> FlagCheck {
        // Public entry point: never assume a dash prefix.
        let Some(body) = flag.strip_prefix('-') else {
            return FlagCheck::rejected("combined flag must start with a dash");
        };
        if body.is_empty() {
            return FlagCheck::rejected("bare dash is not a valid flag");
        }

        if body.chars().count() > MAX_COMBINED_FLAG_CHARS {
            return FlagCheck::rejected("combined flag is too long");
        }
        let mut seen = HashSet::new();
        for c in body.chars() {
            if !seen.insert(c) {
                return FlagCheck::rejected("combined flag repeats a character");
            }
        }
        let allowed = COMBINED_FLAG_PATTERNS
            .get(command)
            .is_some_and(|patterns| patterns.contains(flag));
        if allowed {
            FlagCheck::ok()
        } else {
            FlagCheck::rejected(format!(
                "combined flag '{flag}' is not registered for '{command}'"
            ))
        }
    }
}
