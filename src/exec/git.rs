//! Git wrappers.
//!
//! Thin, typed entry points over [`SecureExecutor`] for the handful of git
//! operations the tool performs. Expected conditions ("not inside a work
//! tree", "config key unset") come back as ordinary result values; callers
//! never parse error strings to distinguish them.

use std::path::PathBuf;
use std::sync::Arc;

use crate::security::validate_identity_value;

use super::executor::{ExecError, ExecOptions, SecureExecutor};
use super::ExecResult;

/// Git config scope for read and write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Local,
    Global,
}

impl ConfigScope {
    const fn flag(self) -> &'static str {
        match self {
            Self::Local => "--local",
            Self::Global => "--global",
        }
    }
}

pub struct GitClient {
    executor: Arc<SecureExecutor>,
    workspace_root: Option<PathBuf>,
}

impl GitClient {
    pub fn new(executor: Arc<SecureExecutor>) -> Self {
        let workspace_root = executor.config().workspace_root.clone();
        Self {
            executor,
            workspace_root,
        }
    }

    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = Some(root);
        self
    }

    /// Run git and trim trailing whitespace from stdout.
    pub async fn exec(&self, args: &[String]) -> ExecResult {
        let raw = self.exec_raw(args).await;
        if raw.success {
            ExecResult::ok(raw.stdout.trim_end().to_string())
        } else {
            raw
        }
    }

    /// Run git preserving stdout byte-for-byte, for output where whitespace
    /// is significant (e.g. `submodule status` indentation).
    pub async fn exec_raw(&self, args: &[String]) -> ExecResult {
        let options = ExecOptions {
            cwd: self.workspace_root.clone(),
            ..ExecOptions::default()
        };
        match self.executor.run("git", args, &options).await {
            Ok(output) => ExecResult::ok(output.stdout),
            Err(ExecError::NonZeroExit { .. }) => ExecResult::fail("git command failed"),
            Err(ExecError::Timeout(_)) => ExecResult::fail("git command timed out"),
            Err(ExecError::Blocked { .. }) => ExecResult::fail("git command not permitted"),
            Err(_) => ExecResult::fail("git is unavailable"),
        }
    }

    /// Read a config key. An unset key is an ordinary failure value, not an
    /// alarm; git exits non-zero for it.
    pub async fn config_get(&self, scope: ConfigScope, key: &str) -> ExecResult {
        self.exec(&[
            "config".to_string(),
            scope.flag().to_string(),
            "--get".to_string(),
            key.to_string(),
        ])
        .await
    }

    pub async fn config_set(&self, scope: ConfigScope, key: &str, value: &str) -> ExecResult {
        self.exec(&[
            "config".to_string(),
            scope.flag().to_string(),
            key.to_string(),
            value.to_string(),
        ])
        .await
    }

    pub async fn config_unset(&self, scope: ConfigScope, key: &str) -> ExecResult {
        self.exec(&[
            "config".to_string(),
            scope.flag().to_string(),
            "--unset".to_string(),
            key.to_string(),
        ])
        .await
    }

    /// Whether the workspace root sits inside a git work tree. Not being in
    /// a repository is `false`, never an error.
    pub async fn is_inside_work_tree(&self) -> bool {
        let result = self
            .exec(&["rev-parse".to_string(), "--is-inside-work-tree".to_string()])
            .await;
        result.success && result.stdout == "true"
    }

    /// Raw `submodule status` output, whitespace preserved for the caller's
    /// parser.
    pub async fn submodule_status(&self) -> ExecResult {
        self.exec_raw(&["submodule".to_string(), "status".to_string()]).await
    }

    /// Write `user.name` and `user.email` after validating both values.
    /// With icons enabled, the stored name carries the identity's icon as a
    /// display prefix.
    pub async fn set_identity(
        &self,
        scope: ConfigScope,
        name: &str,
        email: &str,
        icon: Option<&str>,
    ) -> ExecResult {
        let name_check = validate_identity_value("user.name", name);
        if !name_check.valid {
            let reason = name_check.reason.unwrap_or_else(|| "invalid name".to_string());
            let _ = self.executor.logger().log_validation_failure(name, &reason);
            return ExecResult::fail(reason);
        }
        let email_check = validate_identity_value("user.email", email);
        if !email_check.valid {
            let reason = email_check.reason.unwrap_or_else(|| "invalid email".to_string());
            let _ = self.executor.logger().log_validation_failure(email, &reason);
            return ExecResult::fail(reason);
        }

        let stored_name = match icon {
            Some(icon) if self.executor.config().include_icon => format!("{icon} {name}"),
            _ => name.to_string(),
        };

        let set_name = self.config_set(scope, "user.name", &stored_name).await;
        if !set_name.success {
            return set_name;
        }
        self.config_set(scope, "user.email", email).await
    }
}

impl std::fmt::Debug for GitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitClient")
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}
