//! Command allowlisting.
//!
//! Exactly three external programs may ever be invoked: `git`, `ssh-add`,
//! and `ssh-keygen`. Each carries an immutable policy describing the flags
//! it accepts, whether path positionals are expected, and how many arguments
//! it may receive. Anything outside the table fails closed.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use super::flags::FlagValidator;
use super::path::{PathOptions, PathValidator};

/// Upper bound on the combined byte length of an argument vector, blocking
/// resource-exhaustion attempts through very large argv payloads.
pub const MAX_TOTAL_ARG_BYTES: usize = 16 * 1024;

/// Immutable per-command policy. Defined once at process start.
#[derive(Debug)]
pub struct AllowlistEntry {
    pub command: &'static str,
    pub allowed_flags: HashSet<&'static str>,
    /// First positional argument must be one of these, when present.
    pub allowed_subcommands: Option<HashSet<&'static str>>,
    pub expects_paths: bool,
    pub max_args: usize,
}

static ALLOWLIST: Lazy<Vec<AllowlistEntry>> = Lazy::new(|| {
    vec![
        AllowlistEntry {
            command: "git",
            allowed_flags: HashSet::from([
                "--local",
                "--global",
                "--get",
                "--unset",
                "--is-inside-work-tree",
            ]),
            allowed_subcommands: Some(HashSet::from(["config", "rev-parse", "submodule"])),
            expects_paths: false,
            max_args: 8,
        },
        AllowlistEntry {
            command: "ssh-add",
            allowed_flags: HashSet::from(["-l", "-d", "-K", "--apple-use-keychain"]),
            allowed_subcommands: None,
            expects_paths: true,
            max_args: 4,
        },
        AllowlistEntry {
            command: "ssh-keygen",
            allowed_flags: HashSet::from(["-l", "-f"]),
            allowed_subcommands: None,
            expects_paths: true,
            max_args: 4,
        },
    ]
});

/// Outcome of an allowlist check. Rejection is a value, never an error.
#[derive(Debug, Clone)]
pub struct AllowDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AllowDecision {
    fn ok() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a `(command, args)` pair may run at all.
#[derive(Debug, Default)]
pub struct CommandAllowlist {
    flags: FlagValidator,
    paths: PathValidator,
}

impl CommandAllowlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(command: &str) -> Option<&'static AllowlistEntry> {
        ALLOWLIST.iter().find(|e| e.command == command)
    }

    /// Check the command name and every argument, failing closed on the first
    /// rejection.
    pub fn is_command_allowed(&self, command: &str, args: &[String]) -> AllowDecision {
        let Some(entry) = Self::entry(command) else {
            return AllowDecision::blocked(format!("command '{command}' is not allowlisted"));
        };

        if args.len() > entry.max_args {
            return AllowDecision::blocked(format!(
                "too many arguments for '{command}' ({} > {})",
                args.len(),
                entry.max_args
            ));
        }
        let total_bytes: usize = args.iter().map(String::len).sum();
        if total_bytes > MAX_TOTAL_ARG_BYTES {
            return AllowDecision::blocked("argument vector exceeds the byte bound");
        }

        let mut first_positional_seen = false;
        for arg in args {
            let check = self.flags.validate_flag(arg, command, &entry.allowed_flags);
            if !check.valid {
                return AllowDecision::blocked(
                    check.reason.unwrap_or_else(|| "invalid argument".to_string()),
                );
            }

            if arg.starts_with("--") {
                // Long options are never combined-flag candidates; exact
                // membership is the whole check.
                if !entry.allowed_flags.contains(arg.as_str()) {
                    return AllowDecision::blocked(format!(
                        "option '{arg}' is not allowed for '{command}'"
                    ));
                }
                continue;
            }
            if arg.starts_with('-') {
                continue;
            }

            if !first_positional_seen {
                first_positional_seen = true;
                if let Some(ref subcommands) = entry.allowed_subcommands {
                    if !subcommands.contains(arg.as_str()) {
                        return AllowDecision::blocked(format!(
                            "subcommand '{arg}' is not allowed for '{command}'"
                        ));
                    }
                    continue;
                }
            }

            if entry.expects_paths && looks_like_path(arg) {
                let check = self.paths.validate(arg, &PathOptions::default());
                if !check.valid {
                    return AllowDecision::blocked(
                        check.reason.unwrap_or_else(|| "invalid path argument".to_string()),
                    );
                }
            }
        }

        AllowDecision::ok()
    }
}

/// Positional arguments that reference the filesystem get the full path
/// pipeline; opaque values (config keys, identity strings) do not.
fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || arg.contains('\\') || arg.starts_with('~') || arg.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_git_config_write_allowed() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist
            .is_command_allowed("git", &args(&["config", "--local", "user.name", "Jane Doe"]));
        assert!(decision.allowed, "{:?}", decision.reason);
    }

    #[test]
    fn test_rev_parse_allowed() {
        let allowlist = CommandAllowlist::new();
        let decision =
            allowlist.is_command_allowed("git", &args(&["rev-parse", "--is-inside-work-tree"]));
        assert!(decision.allowed, "{:?}", decision.reason);
    }

    #[test]
    fn test_unknown_command_blocked() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("curl", &args(&["https://example.com"]));
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("not allowlisted"));
    }

    #[test]
    fn test_unknown_git_subcommand_blocked() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("git", &args(&["push", "--force"]));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_unknown_long_option_blocked() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("git", &args(&["config", "--system"]));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_too_many_arguments_blocked() {
        let allowlist = CommandAllowlist::new();
        let many: Vec<String> = (0..20).map(|i| format!("a{i}")).collect();
        let decision = allowlist.is_command_allowed("git", &many);
        assert!(!decision.allowed);
    }

    #[test]
    fn test_argument_byte_bound() {
        let allowlist = CommandAllowlist::new();
        let decision =
            allowlist.is_command_allowed("git", &args(&["config", &"x".repeat(20_000)]));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_ssh_add_list() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("ssh-add", &args(&["-l"]));
        assert!(decision.allowed);
    }

    #[test]
    fn test_ssh_add_traversal_path_blocked() {
        let allowlist = CommandAllowlist::new();
        let decision =
            allowlist.is_command_allowed("ssh-add", &args(&["-d", "/home/u/../../etc/shadow"]));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_ssh_keygen_fingerprint() {
        let allowlist = CommandAllowlist::new();
        let decision =
            allowlist.is_command_allowed("ssh-keygen", &args(&["-lf", "/home/u/.ssh/id_ed25519"]));
        assert!(decision.allowed, "{:?}", decision.reason);
    }

    #[test]
    fn test_smuggled_flag_value_blocked() {
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("ssh-keygen", &args(&["-f/etc/passwd"]));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_injection_text_is_inert_but_checked() {
        // No shell ever parses the argument vector, so shell metacharacters in
        // an opaque value are harmless; the decision only depends on the
        // argument checks themselves.
        let allowlist = CommandAllowlist::new();
        let decision = allowlist.is_command_allowed("git", &args(&["config", "x; rm -rf y"]));
        assert!(decision.allowed);
    }
}
