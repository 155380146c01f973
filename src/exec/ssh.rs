//! SSH agent and key wrappers.
//!
//! Key paths go through the dedicated key-path pipeline before they reach
//! `ssh-add` or `ssh-keygen`: symlinks resolved, permissions audited, weak
//! permissions logged. `ssh-add -l` exiting 1 means "no identities", which
//! is a value here, not a failure.

use std::sync::Arc;

use crate::security::PathValidator;

use super::executor::{ExecError, ExecOptions, SecureExecutor};
use super::ExecResult;

pub struct SshAgentClient {
    executor: Arc<SecureExecutor>,
    paths: PathValidator,
}

impl SshAgentClient {
    pub fn new(executor: Arc<SecureExecutor>) -> Self {
        Self {
            executor,
            paths: PathValidator::new(),
        }
    }

    /// List loaded identities. No identities is an empty success.
    pub async fn list_keys(&self) -> ExecResult {
        match self
            .executor
            .run("ssh-add", &["-l".to_string()], &ExecOptions::default())
            .await
        {
            Ok(output) => ExecResult::ok(output.stdout.trim_end().to_string()),
            // ssh-add exits 1 with "The agent has no identities."
            Err(ExecError::NonZeroExit { code: Some(1), .. }) => ExecResult::ok(String::new()),
            Err(ExecError::Timeout(_)) => ExecResult::fail("ssh-agent did not respond"),
            Err(_) => ExecResult::fail("ssh-agent is unavailable"),
        }
    }

    /// Add a key to the agent. On macOS the passphrase can be taken from
    /// the keychain.
    pub async fn add_key(&self, key_path: &str, use_keychain: bool) -> ExecResult {
        let Some(validated) = self.checked_key_path(key_path) else {
            return ExecResult::fail("invalid key path");
        };

        let mut args = Vec::new();
        if use_keychain && cfg!(target_os = "macos") {
            args.push("--apple-use-keychain".to_string());
        }
        args.push(validated);

        match self.executor.run("ssh-add", &args, &ExecOptions::default()).await {
            Ok(_) => ExecResult::ok(String::new()),
            Err(ExecError::Timeout(_)) => ExecResult::fail("ssh-add timed out"),
            Err(_) => ExecResult::fail("could not add key to agent"),
        }
    }

    /// Remove a key from the agent.
    pub async fn remove_key(&self, key_path: &str) -> ExecResult {
        let Some(validated) = self.checked_key_path(key_path) else {
            return ExecResult::fail("invalid key path");
        };

        let args = vec!["-d".to_string(), validated];
        match self.executor.run("ssh-add", &args, &ExecOptions::default()).await {
            Ok(_) => ExecResult::ok(String::new()),
            Err(_) => ExecResult::fail("could not remove key from agent"),
        }
    }

    /// Fingerprint a key file via `ssh-keygen -lf`.
    pub async fn key_fingerprint(&self, key_path: &str) -> ExecResult {
        let Some(validated) = self.checked_key_path(key_path) else {
            return ExecResult::fail("invalid key path");
        };

        let args = vec!["-lf".to_string(), validated];
        match self.executor.run("ssh-keygen", &args, &ExecOptions::default()).await {
            Ok(output) => ExecResult::ok(output.stdout.trim_end().to_string()),
            Err(_) => ExecResult::fail("could not read key fingerprint"),
        }
    }

    /// Validate a key path, audit any permission warnings, and return the
    /// normalized path to hand to the tool.
    fn checked_key_path(&self, raw: &str) -> Option<String> {
        let check = self.paths.validate_ssh_key_path(raw);
        for warning in &check.warnings {
            let _ = self.executor.logger().log_weak_key_permissions(warning);
        }
        if !check.valid {
            let reason = check.reason.clone().unwrap_or_else(|| "invalid path".to_string());
            let _ = self.executor.logger().log_validation_failure(raw, &reason);
            return None;
        }
        check
            .normalized
            .map(|path| path.to_string_lossy().into_owned())
    }
}

impl std::fmt::Debug for SshAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshAgentClient").finish_non_exhaustive()
    }
}
