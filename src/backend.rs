//! Backend dispatch contract shared by local, memory and search mounts.
//!
//! Skill mounts do not implement [`Backend`]; filesystem operations on a
//! skill mountpoint travel through the skill dispatcher's JSON contract
//! instead.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::Result;

/// Size, modification time and kind of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStat {
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_dir: bool,
}

/// Operations a mounted backend serves on paths relative to its mountpoint.
///
/// Read-only enforcement happens in the router before any backend call, so
/// implementations may assume mutating calls are permitted when reached.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read the entry at `rel` as raw bytes.
    async fn read(&self, rel: &str) -> Result<Vec<u8>>;

    /// Write `data` at `rel`, creating missing parents.
    async fn write(&self, rel: &str, data: &[u8]) -> Result<()>;

    /// Names of the entries under `rel`, with no trailing-slash convention.
    async fn list(&self, rel: &str) -> Result<Vec<String>>;

    /// Stat the entry at `rel`.
    async fn stat(&self, rel: &str) -> Result<EntryStat>;

    /// Remove the entry at `rel`.
    async fn remove(&self, rel: &str) -> Result<()>;
}
