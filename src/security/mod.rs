//! Security module for gitswitch.
//!
//! Provides the validation half of the execution pipeline:
//! - Path normalization, traversal, symlink, and Unicode validation
//! - Flag validation against per-command allowlists
//! - Command allowlisting for the fixed three-program surface
//! - Identity field validation
//! - Sensitive-data redaction for audit records
//! - Key-file permission auditing
//!
//! # Security Philosophy
//!
//! gitswitch follows a defense-in-depth approach:
//! 1. **Fail closed**: anything not explicitly allowlisted is rejected
//! 2. **No shell, ever**: arguments travel as vectors to absolute binaries
//! 3. **Rejection is a value**: validators return bool-plus-reason results,
//!    never errors, so callers can present a message without unwinding
//! 4. **Independent layers**: a bypassed check must not compromise the rest

mod allowlist;
mod flags;
mod identity;
mod path;
mod permissions;
mod redact;

pub use allowlist::{AllowDecision, AllowlistEntry, CommandAllowlist, MAX_TOTAL_ARG_BYTES};
pub use flags::{FlagCheck, FlagValidator, MAX_COMBINED_FLAG_CHARS, MAX_SHORT_FLAG_CHARS};
pub use identity::{validate_identity_value, IdentityCheck, MAX_IDENTITY_BYTES};
pub use path::{PathCheck, PathOptions, PathValidator, MAX_PATH_BYTES};
pub use permissions::KeyFileChecker;
pub use redact::{Redactor, MAX_LOGGED_VALUE_BYTES, REDACTED, TRUNCATED};
