//! Identity field validation.
//!
//! `user.name` and `user.email` values are written into git configuration
//! and later echoed into shells, commit templates, and hook environments by
//! tools outside our control. The values themselves are therefore held to a
//! stricter standard than ordinary opaque arguments.

use unicode_normalization::UnicodeNormalization;

use super::path::{has_control_chars, has_invisible_chars};

/// Maximum byte length for an identity field value.
pub const MAX_IDENTITY_BYTES: usize = 256;

/// Shell metacharacters that have no business in a name or email.
const FORBIDDEN_CHARS: &[char] = &['`', '$', ';', '|', '&', '<', '>', '"', '\\'];

/// Outcome of identity validation. Same shape as the other validators:
/// rejection is a value.
#[derive(Debug, Clone)]
pub struct IdentityCheck {
    pub valid: bool,
    pub reason: Option<String>,
}

impl IdentityCheck {
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

/// Validate a `user.name` / `user.email` value before it is written.
pub fn validate_identity_value(field: &str, value: &str) -> IdentityCheck {
    if value.trim().is_empty() {
        return IdentityCheck::rejected(format!("{field} must not be empty"));
    }
    if value.len() > MAX_IDENTITY_BYTES {
        return IdentityCheck::rejected(format!("{field} exceeds {MAX_IDENTITY_BYTES} bytes"));
    }
    if value.contains('\0') || has_control_chars(value) {
        return IdentityCheck::rejected(format!("{field} contains control characters"));
    }
    if has_invisible_chars(value) {
        return IdentityCheck::rejected(format!("{field} contains invisible characters"));
    }
    if let Some(c) = value.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return IdentityCheck::rejected(format!("{field} contains forbidden character '{c}'"));
    }
    let normalized: String = value.nfc().collect();
    if has_control_chars(&normalized) || has_invisible_chars(&normalized) {
        return IdentityCheck::rejected(format!(
            "{field} contains hidden characters after normalization"
        ));
    }
    IdentityCheck::ok()
}
