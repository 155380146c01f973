//! Execution layer: binary resolution, the secure executor, and the typed
//! git / ssh wrappers built on top of it.

mod executor;
mod git;
mod resolver;
mod ssh;

pub use executor::{
    ExecError, ExecOptions, ExecOutput, SecureExecutor, TimeoutError, GLOBAL_DEFAULT_TIMEOUT_MS,
    MAX_TIMEOUT_MS,
};
pub use git::{ConfigScope, GitClient};
pub use resolver::{BinaryResolutionError, BinaryResolver};
pub use ssh::SshAgentClient;

/// Discriminated outcome of a wrapper-level command. Expected failures
/// ("not a repository", "key not loaded") are values, so the UI never has
/// to parse exception text.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub success: bool,
    pub stdout: String,
    pub error: Option<String>,
}

impl ExecResult {
    pub fn ok(stdout: String) -> Self {
        Self {
            success: true,
            stdout,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            error: Some(error.into()),
        }
    }
}
