//! gitswitch: secure git identity switching.
//!
//! The crate is built around one rule: no external command runs without
//! passing the full pipeline. [`security`] holds the validators (paths,
//! flags, identities, the command allowlist, redaction), [`exec`] holds the
//! single spawning code path plus typed git and ssh wrappers, and [`audit`]
//! records every rejection, timeout, and weak-permission finding as a
//! sanitized JSON line.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gitswitch::audit::SecurityLogger;
//! use gitswitch::config::HostConfig;
//! use gitswitch::exec::{ConfigScope, GitClient, SecureExecutor};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let logger = Arc::new(SecurityLogger::new(std::path::Path::new("/tmp/gitswitch"))?);
//! let executor = Arc::new(SecureExecutor::new(HostConfig::default(), logger));
//! let git = GitClient::new(executor);
//! let result = git
//!     .set_identity(ConfigScope::Local, "Jane Doe", "jane@example.com", None)
//!     .await;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod exec;
pub mod security;

pub use audit::{SecurityEventKind, SecurityLogger};
pub use config::HostConfig;
pub use exec::{ExecResult, GitClient, SecureExecutor, SshAgentClient};
pub use security::{CommandAllowlist, PathValidator};

/// Crate version, surfaced to hosts for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name used in log targets and storage paths.
pub const APP_NAME: &str = "gitswitch";

/// Install the global tracing subscriber. Hosts call this once at startup;
/// `GITSWITCH_LOG` controls the filter, defaulting to warnings plus this
/// crate's info-level events.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("GITSWITCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn,gitswitch=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
