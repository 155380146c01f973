//! Audit logging: append-only, size-rotated, sanitized security events.

mod logger;

pub use logger::{AuditError, SecurityEvent, SecurityEventKind, SecurityLogger, Severity};
