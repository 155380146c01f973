//! Tamper-resistant security event logging.
//!
//! Every validation failure, blocked command, timeout, and resolution
//! failure lands here as a structured, sanitized JSON record, one per line.
//! The file writer rotates by size and disables itself rather than loop on a
//! failing rotation. Events are additionally mirrored to `tracing` at
//! warning level and above, so a Disabled writer never drops events silently.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::security::{PathOptions, PathValidator, Redactor};

/// Active log file name inside the storage directory.
const ACTIVE_LOG_NAME: &str = "security.log";

/// Rotation threshold in bytes.
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Rotated files kept on disk, pruned oldest-first beyond this count.
const RETAINED_ROTATIONS: usize = 5;

/// Rotation attempts before the writer gives up and disables file logging.
const MAX_ROTATION_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid audit storage directory: {0}")]
    InvalidStorageDir(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Event severity, mapped to the record's `level` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// The fixed taxonomy of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventKind {
    CommandBlocked,
    CommandTimeout,
    ValidationFailure,
    PathTraversalAttempt,
    WeakKeyPermissions,
    BinaryResolutionFailure,
    AuditRotation,
}

impl SecurityEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandBlocked => "COMMAND_BLOCKED",
            Self::CommandTimeout => "COMMAND_TIMEOUT",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::PathTraversalAttempt => "PATH_TRAVERSAL_ATTEMPT",
            Self::WeakKeyPermissions => "WEAK_KEY_PERMISSIONS",
            Self::BinaryResolutionFailure => "BINARY_RESOLUTION_FAILURE",
            Self::AuditRotation => "AUDIT_ROTATION",
        }
    }

    fn category(self) -> &'static str {
        match self {
            Self::CommandBlocked | Self::CommandTimeout | Self::BinaryResolutionFailure => {
                "execution"
            }
            Self::ValidationFailure | Self::PathTraversalAttempt | Self::WeakKeyPermissions => {
                "validation"
            }
            Self::AuditRotation => "audit",
        }
    }

    fn severity(self) -> Severity {
        match self {
            Self::AuditRotation => Severity::Info,
            Self::CommandTimeout | Self::WeakKeyPermissions | Self::BinaryResolutionFailure => {
                Severity::Warning
            }
            Self::CommandBlocked | Self::ValidationFailure | Self::PathTraversalAttempt => {
                Severity::Critical
            }
        }
    }
}

/// One audit record. `meta` has already been through the redactor by the
/// time a record is constructed; there is no way to log raw metadata.
#[derive(Debug, Serialize)]
pub struct SecurityEvent {
    pub ts: String,
    pub level: Severity,
    pub category: &'static str,
    pub event: &'static str,
    pub meta: serde_json::Value,
}

/// File writer states. Rotation failures beyond the retry ceiling park the
/// writer in `Disabled`, where writes are no-ops.
#[derive(Debug)]
enum WriterState {
    Uninitialized,
    Initialized(File),
    Disabled,
}

#[derive(Debug)]
struct RotatingWriter {
    dir: PathBuf,
    state: WriterState,
    rotation_retries: u32,
    #[cfg(test)]
    fail_next_rotation: bool,
}

impl RotatingWriter {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            state: WriterState::Uninitialized,
            rotation_retries: 0,
            #[cfg(test)]
            fail_next_rotation: false,
        }
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_LOG_NAME)
    }

    /// Returns the rotated file path when this write triggered a rotation,
    /// so the caller can record the rotation as an event of its own.
    fn write_line(&mut self, line: &str) -> std::io::Result<Option<PathBuf>> {
        if matches!(self.state, WriterState::Uninitialized) {
            self.initialize()?;
        }
        if matches!(self.state, WriterState::Disabled) {
            return Ok(None);
        }

        let rotated = self.rotate_if_needed();
        // A failed rotation below the retry ceiling leaves the active file in
        // place; reopen it and keep appending. An oversized log is better
        // than a dropped event.
        if matches!(self.state, WriterState::Uninitialized) {
            self.initialize()?;
        }
        if let WriterState::Initialized(ref mut file) = self.state {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()?;
        }
        Ok(rotated)
    }

    fn initialize(&mut self) -> std::io::Result<()> {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            self.state = WriterState::Disabled;
            return Err(err);
        }
        match OpenOptions::new().create(true).append(true).open(self.active_path()) {
            Ok(file) => {
                self.state = WriterState::Initialized(file);
                Ok(())
            }
            Err(err) => {
                self.state = WriterState::Disabled;
                Err(err)
            }
        }
    }

    /// Size-triggered rotation: close, rename with a timestamp suffix, prune
    /// excess rotated files, reopen. A bounded number of consecutive failures
    /// disables file logging instead of retrying forever.
    fn rotate_if_needed(&mut self) -> Option<PathBuf> {
        let len = match fs::metadata(self.active_path()) {
            Ok(metadata) => metadata.len(),
            Err(_) => return None,
        };
        if len < MAX_LOG_BYTES {
            return None;
        }

        self.state = WriterState::Uninitialized;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let rotated = self.dir.join(format!("security.{stamp}.log"));

        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_rotation) {
            return self.record_rotation_failure(std::io::Error::other("rotation failure injected"));
        }

        let outcome = fs::rename(self.active_path(), &rotated).and_then(|()| {
            self.prune_rotated();
            self.initialize()
        });

        match outcome {
            Ok(()) => {
                self.rotation_retries = 0;
                tracing::debug!(target: "gitswitch::audit", rotated = %rotated.display(), "audit log rotated");
                Some(rotated)
            }
            Err(err) => self.record_rotation_failure(err),
        }
    }

    fn record_rotation_failure(&mut self, err: std::io::Error) -> Option<PathBuf> {
        self.rotation_retries += 1;
        tracing::warn!(target: "gitswitch::audit", error = %err, retries = self.rotation_retries, "audit log rotation failed");
        if self.rotation_retries >= MAX_ROTATION_RETRIES {
            self.state = WriterState::Disabled;
            tracing::warn!(target: "gitswitch::audit", "file audit logging disabled after repeated rotation failures");
        }
        None
    }

    fn prune_rotated(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        let mut rotated: Vec<(std::time::SystemTime, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with("security.") && name.ends_with(".log") && name != ACTIVE_LOG_NAME
                {
                    let mtime = entry.metadata().ok()?.modified().ok()?;
                    Some((mtime, entry.path()))
                } else {
                    None
                }
            })
            .collect();
        rotated.sort_by_key(|(mtime, _)| *mtime);
        while rotated.len() > RETAINED_ROTATIONS {
            let (_, path) = rotated.remove(0);
            let _ = fs::remove_file(path);
        }
    }
}

/// Append-only security event logger.
///
/// The storage directory comes from the host environment at startup, never
/// from user configuration, and is itself validated through the path
/// pipeline before first use.
#[derive(Debug)]
pub struct SecurityLogger {
    redactor: Redactor,
    writer: Mutex<RotatingWriter>,
}

impl SecurityLogger {
    pub fn new(storage_root: &Path) -> Result<Self, AuditError> {
        let validator = PathValidator::new();
        let check = validator.validate(
            &storage_root.to_string_lossy(),
            &PathOptions {
                resolve_symlinks: false,
                require_exists: false,
                base_dir: None,
            },
        );
        let Some(dir) = check.normalized else {
            return Err(AuditError::InvalidStorageDir(
                check.reason.unwrap_or_default(),
            ));
        };

        Ok(Self {
            redactor: Redactor::new(),
            writer: Mutex::new(RotatingWriter::new(dir.join("audit"))),
        })
    }

    /// Record an event. Metadata is sanitized unconditionally; there is no
    /// raw-logging path. Returns `Err` only for I/O problems, which callers
    /// treat as best-effort.
    pub fn log(
        &self,
        kind: SecurityEventKind,
        meta: serde_json::Value,
    ) -> Result<(), AuditError> {
        let event = self.build_event(kind, Utc::now(), meta);

        match event.level {
            Severity::Critical => {
                tracing::warn!(target: "gitswitch::audit", event = event.event, meta = %event.meta, "security event");
            }
            Severity::Warning => {
                tracing::warn!(target: "gitswitch::audit", event = event.event, meta = %event.meta, "security event");
            }
            Severity::Info => {
                tracing::info!(target: "gitswitch::audit", event = event.event, meta = %event.meta, "security event");
            }
        }

        let line = serde_json::to_string(&event)
            .map_err(|err| AuditError::Io(std::io::Error::other(err)))?;
        let rotated = self.writer.lock().write_line(&line)?;

        // A rotation is itself auditable. The lock is released by now, and a
        // fresh log never rotates again immediately, so this cannot recurse
        // further.
        if let Some(rotated) = rotated {
            if kind != SecurityEventKind::AuditRotation {
                let _ = self.log(
                    SecurityEventKind::AuditRotation,
                    serde_json::json!({ "rotated_to": rotated.to_string_lossy() }),
                );
            }
        }
        Ok(())
    }

    fn build_event(
        &self,
        kind: SecurityEventKind,
        at: DateTime<Utc>,
        meta: serde_json::Value,
    ) -> SecurityEvent {
        SecurityEvent {
            ts: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            level: kind.severity(),
            category: kind.category(),
            event: kind.as_str(),
            meta: self.redactor.sanitize_json(&meta),
        }
    }

    // Convenience entry points used by the execution pipeline. All of these
    // are best-effort at the call site; see the executor.

    pub fn log_command_blocked(
        &self,
        command: &str,
        args: &[String],
        reason: &str,
    ) -> Result<(), AuditError> {
        self.log(
            SecurityEventKind::CommandBlocked,
            serde_json::json!({ "command": command, "args": args, "reason": reason }),
        )
    }

    pub fn log_command_timeout(
        &self,
        command: &str,
        args: &[String],
        timeout_ms: u64,
    ) -> Result<(), AuditError> {
        self.log(
            SecurityEventKind::CommandTimeout,
            serde_json::json!({ "command": command, "args": args, "timeout_ms": timeout_ms }),
        )
    }

    /// Traversal rejections get their own event kind; everything else lands
    /// as a generic validation failure.
    pub fn log_validation_failure(&self, what: &str, reason: &str) -> Result<(), AuditError> {
        let kind = if reason.contains("traversal") {
            SecurityEventKind::PathTraversalAttempt
        } else {
            SecurityEventKind::ValidationFailure
        };
        self.log(kind, serde_json::json!({ "value": what, "reason": reason }))
    }

    pub fn log_binary_resolution_failure(
        &self,
        command: &str,
        reason: &str,
    ) -> Result<(), AuditError> {
        self.log(
            SecurityEventKind::BinaryResolutionFailure,
            serde_json::json!({ "command": command, "reason": reason }),
        )
    }

    pub fn log_weak_key_permissions(&self, detail: &str) -> Result<(), AuditError> {
        self.log(
            SecurityEventKind::WeakKeyPermissions,
            serde_json::json!({ "detail": detail }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn read_lines(dir: &Path) -> Vec<serde_json::Value> {
        let content = fs::read_to_string(dir.join("audit").join(ACTIVE_LOG_NAME)).unwrap();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_rejects_invalid_storage_dir() {
        let result = SecurityLogger::new(Path::new("/var/../../etc"));
        assert!(matches!(result, Err(AuditError::InvalidStorageDir(_))));
    }

    #[test]
    fn test_writes_one_json_record_per_line() {
        let dir = tempdir().unwrap();
        let logger = SecurityLogger::new(dir.path()).unwrap();

        logger
            .log_command_blocked("curl", &["https://x".to_string()], "not allowlisted")
            .unwrap();
        logger.log_validation_failure("-lx", "unknown combined flag").unwrap();

        let records = read_lines(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["event"], "COMMAND_BLOCKED");
        assert_eq!(records[0]["level"], "critical");
        assert_eq!(records[0]["category"], "execution");
        assert_eq!(records[1]["event"], "VALIDATION_FAILURE");
        assert!(records[0]["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_metadata_is_sanitized() {
        let dir = tempdir().unwrap();
        let logger = SecurityLogger::new(dir.path()).unwrap();

        logger
            .log(
                SecurityEventKind::WeakKeyPermissions,
                json!({ "detail": "/home/jane/.ssh/id_rsa is world-readable" }),
            )
            .unwrap();

        let records = read_lines(dir.path());
        assert_eq!(records[0]["meta"]["detail"], crate::security::REDACTED);
    }

    #[test]
    fn test_timeout_event_carries_context() {
        let dir = tempdir().unwrap();
        let logger = SecurityLogger::new(dir.path()).unwrap();

        logger
            .log_command_timeout("git", &["rev-parse".to_string()], 5000)
            .unwrap();

        let records = read_lines(dir.path());
        assert_eq!(records[0]["event"], "COMMAND_TIMEOUT");
        assert_eq!(records[0]["meta"]["timeout_ms"], 5000);
        assert_eq!(records[0]["meta"]["args"][0], "rev-parse");
    }

    #[test]
    fn test_rotation_by_size() {
        let dir = tempdir().unwrap();
        let logger = SecurityLogger::new(dir.path()).unwrap();

        // First write initializes the file; pad it past the threshold, then
        // write again to trigger rotation.
        logger.log_validation_failure("seed", "seed").unwrap();
        let active = dir.path().join("audit").join(ACTIVE_LOG_NAME);
        {
            let mut file = OpenOptions::new().append(true).open(&active).unwrap();
            let pad = vec![b'x'; (MAX_LOG_BYTES + 1) as usize];
            file.write_all(&pad).unwrap();
        }
        logger.log_validation_failure("after", "rotation").unwrap();

        let rotated: Vec<_> = fs::read_dir(dir.path().join("audit"))
            .unwrap()
            .flatten()
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with("security.") && name != ACTIVE_LOG_NAME
            })
            .collect();
        assert_eq!(rotated.len(), 1);

        // Active log was reopened, holding the post-rotation record plus the
        // rotation event itself.
        let records = read_lines(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["meta"]["value"], "after");
        assert_eq!(records[1]["event"], "AUDIT_ROTATION");
        assert_eq!(records[1]["level"], "info");
    }

    #[test]
    fn test_failed_rotation_never_drops_the_event() {
        let dir = tempdir().unwrap();
        let mut writer = RotatingWriter::new(dir.path().to_path_buf());
        writer.write_line("seed").unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(dir.path().join(ACTIVE_LOG_NAME))
                .unwrap();
            let pad = vec![b'x'; (MAX_LOG_BYTES + 1) as usize];
            file.write_all(&pad).unwrap();
        }

        writer.fail_next_rotation = true;
        let rotated = writer.write_line("survivor").unwrap();
        assert!(rotated.is_none());
        assert!(matches!(writer.state, WriterState::Initialized(_)));

        // The event landed in the still-oversized active file.
        let content = fs::read_to_string(dir.path().join(ACTIVE_LOG_NAME)).unwrap();
        assert!(content.ends_with("survivor\n"));

        // The next write rotates normally and the retry counter resets.
        let rotated = writer.write_line("after").unwrap();
        assert!(rotated.is_some());
        assert_eq!(writer.rotation_retries, 0);
    }

    #[test]
    fn test_repeated_rotation_failures_disable_the_writer() {
        let dir = tempdir().unwrap();
        let mut writer = RotatingWriter::new(dir.path().to_path_buf());
        writer.write_line("seed").unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(dir.path().join(ACTIVE_LOG_NAME))
                .unwrap();
            let pad = vec![b'x'; (MAX_LOG_BYTES + 1) as usize];
            file.write_all(&pad).unwrap();
        }

        for _ in 0..MAX_ROTATION_RETRIES {
            writer.fail_next_rotation = true;
            writer.write_line("attempt").unwrap();
        }
        assert!(matches!(writer.state, WriterState::Disabled));

        // Writes are no-ops once disabled.
        let before = fs::read_to_string(dir.path().join(ACTIVE_LOG_NAME)).unwrap();
        writer.write_line("dropped").unwrap();
        let after = fs::read_to_string(dir.path().join(ACTIVE_LOG_NAME)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_traversal_rejections_get_their_own_event() {
        let dir = tempdir().unwrap();
        let logger = SecurityLogger::new(dir.path()).unwrap();

        logger
            .log_validation_failure(
                "../../etc/shadow",
                "path contains a parent-directory traversal segment",
            )
            .unwrap();
        logger.log_validation_failure("-lx", "unknown combined flag").unwrap();

        let records = read_lines(dir.path());
        assert_eq!(records[0]["event"], "PATH_TRAVERSAL_ATTEMPT");
        assert_eq!(records[1]["event"], "VALIDATION_FAILURE");
    }
}
