//! Command validation for the `execute_command` contract.
//!
//! The core validates and audits commands; actually spawning a process is
//! delegated to an optional [`CommandRunner`] supplied by the embedder.

use async_trait::async_trait;

use crate::{Error, Result};

/// Decides whether a command may run in a session.
pub trait CommandPolicy: Send + Sync {
    /// Return `Err(AccessDenied)` to block the command.
    fn validate(&self, command: &str, args: &[String]) -> Result<()>;
}

/// Executes a validated command. Out of scope for the core; embedders
/// plug one in when they want `execute_command` to do real work.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, args: &[String]) -> Result<Vec<u8>>;
}

/// Names blocked outright: destructive, disk-level and privilege-raising
/// commands.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm", "del", "rmdir", "format", "mkfs", "dd", "fdisk", "shutdown", "reboot", "halt",
    "poweroff", "init", "sudo", "su", "doas",
];

/// System prefixes no argument may write into.
const SYSTEM_PREFIXES: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

/// The default policy: blocks a fixed list of dangerous command names and
/// argument patterns indicating recursive deletes or writes to system
/// paths.
#[derive(Debug, Default)]
pub struct DangerousCommandPolicy;

impl DangerousCommandPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl CommandPolicy for DangerousCommandPolicy {
    fn validate(&self, command: &str, args: &[String]) -> Result<()> {
        let name = command.rsplit(['/', '\\']).next().unwrap_or(command).to_ascii_lowercase();
        if BLOCKED_COMMANDS.contains(&name.as_str()) {
            return Err(Error::AccessDenied(format!("command {name} is blocked")));
        }

        for arg in args {
            let lower = arg.to_ascii_lowercase();
            if matches!(lower.as_str(), "-rf" | "-fr" | "--recursive-force") {
                return Err(Error::AccessDenied("recursive force flags are blocked".to_owned()));
            }
            if SYSTEM_PREFIXES.iter().any(|p| crate::path::is_path_prefix(p, &lower)) {
                return Err(Error::AccessDenied(format!("argument {arg} targets a system path")));
            }
        }
        Ok(())
    }
}
