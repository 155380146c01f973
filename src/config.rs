//! Host configuration.
//!
//! Everything here is optional and user-supplied, so nothing in this struct
//! is trusted: timeout overrides are range-checked at use, the git path is
//! verified before it is ever executed, and the workspace root goes through
//! the path pipeline. Unknown or missing fields deserialize to defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// User-tunable settings consulted by the execution layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Repository the git wrappers operate in.
    pub workspace_root: Option<PathBuf>,

    /// Explicit git binary; wins over lookup only when it verifies.
    pub git_path: Option<PathBuf>,

    /// Per-command timeout overrides in milliseconds. Values outside
    /// `1..=600_000` are ignored, so a zero or negative entry behaves the
    /// same as no entry at all.
    pub timeout_overrides: HashMap<String, i64>,

    /// Prefix committed identities with a per-identity icon.
    pub include_icon: bool,
}
