//! The only process-spawning code path in the crate.
//!
//! Every external invocation flows through [`SecureExecutor::run`]:
//! allowlist check, binary resolution, timeout selection, then a direct
//! spawn of the absolute path with a vectored argument list. No shell is
//! ever involved, so shell metacharacters in arguments stay inert text.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::audit::SecurityLogger;
use crate::config::HostConfig;
use crate::security::CommandAllowlist;

use super::resolver::{BinaryResolutionError, BinaryResolver};

/// Fallback timeout when neither an override nor a per-command default
/// applies.
pub const GLOBAL_DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on any effective timeout (10 minutes).
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// A command exceeded its effective timeout. Carries enough context to show
/// the user exactly what was running and for how long.
#[derive(Debug, Error)]
#[error("'{command}' timed out after {timeout_ms} ms")]
pub struct TimeoutError {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command blocked: {reason}")]
    Blocked { command: String, reason: String },

    #[error(transparent)]
    Resolution(#[from] BinaryResolutionError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("'{command}' exited with status {code:?}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Captured output of a successful (zero-exit) invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Per-call knobs. Everything defaults off.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Overrides every configured and default timeout when set.
    pub timeout: Option<Duration>,
    pub cwd: Option<PathBuf>,
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

pub struct SecureExecutor {
    allowlist: CommandAllowlist,
    resolver: BinaryResolver,
    logger: Arc<SecurityLogger>,
    config: HostConfig,
}

impl SecureExecutor {
    pub fn new(config: HostConfig, logger: Arc<SecurityLogger>) -> Self {
        let resolver = BinaryResolver::new(config.git_path.clone());
        Self {
            allowlist: CommandAllowlist::new(),
            resolver,
            logger,
            config,
        }
    }

    /// Swap in a preconfigured resolver, e.g. one with a custom lookup.
    pub fn with_resolver(mut self, resolver: BinaryResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn logger(&self) -> &Arc<SecurityLogger> {
        &self.logger
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Run an allowlisted command to completion and capture its output.
    ///
    /// Blocked commands and timeouts are audited before the error returns.
    /// Ordinary execution failures (spawn errors, non-zero exits) are the
    /// caller's business and are not security events.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        if options.cancelled() {
            return Err(ExecError::Cancelled);
        }

        let decision = self.allowlist.is_command_allowed(command, args);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_else(|| "blocked".to_string());
            // Audit writes are best-effort; a full disk must not mask the
            // rejection itself.
            let _ = self.logger.log_command_blocked(command, args, &reason);
            return Err(ExecError::Blocked {
                command: command.to_string(),
                reason,
            });
        }

        if options.cancelled() {
            return Err(ExecError::Cancelled);
        }

        let binary = match self.resolver.get_binary_path(command) {
            Ok(path) => path,
            Err(err) => {
                let _ = self
                    .logger
                    .log_binary_resolution_failure(command, &err.to_string());
                return Err(err.into());
            }
        };

        let timeout_ms = self.effective_timeout_ms(command, options.timeout);

        if options.cancelled() {
            return Err(ExecError::Cancelled);
        }

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = options.cwd {
            cmd.current_dir(cwd);
        }

        tracing::debug!(
            target: "gitswitch::exec",
            command,
            binary = %binary.display(),
            timeout_ms,
            "spawning"
        );

        let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), cmd.output())
            .await
        {
            Ok(io_result) => io_result.map_err(|source| ExecError::Io {
                command: command.to_string(),
                source,
            })?,
            Err(_elapsed) => {
                // Dropping the future kills the child via kill_on_drop.
                let _ = self.logger.log_command_timeout(command, args, timeout_ms);
                return Err(TimeoutError {
                    command: command.to_string(),
                    args: args.to_vec(),
                    timeout_ms,
                }
                .into());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ExecError::NonZeroExit {
                command: command.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(ExecOutput { stdout, stderr })
    }

    /// Select the effective timeout by priority: per-call override, then the
    /// configured per-command override, then the per-command default, then
    /// the global default. Invalid candidates are discarded, never clamped.
    fn effective_timeout_ms(&self, command: &str, per_call: Option<Duration>) -> u64 {
        if let Some(duration) = per_call {
            let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            if valid_timeout_ms(ms) {
                return ms;
            }
        }

        if let Some(&configured) = self.config.timeout_overrides.get(command) {
            if let Ok(ms) = u64::try_from(configured) {
                if valid_timeout_ms(ms) {
                    return ms;
                }
            }
            tracing::warn!(
                target: "gitswitch::exec",
                command,
                configured,
                "ignoring out-of-range timeout override"
            );
        }

        command_default_timeout_ms(command).unwrap_or(GLOBAL_DEFAULT_TIMEOUT_MS)
    }
}

impl std::fmt::Debug for SecureExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn valid_timeout_ms(ms: u64) -> bool {
    (1..=MAX_TIMEOUT_MS).contains(&ms)
}

/// Per-command defaults. git gets headroom for slow filesystems; the agent
/// tools answer quickly or not at all.
fn command_default_timeout_ms(command: &str) -> Option<u64> {
    match command {
        "git" => Some(15_000),
        "ssh-add" | "ssh-keygen" => Some(5_000),
        _ => None,
    }
}
