//! Router configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Configuration for a [`crate::ToolFs`] instance.
///
/// All fields have defaults, so an empty TOML document yields a router
/// rooted at `/toolfs` with the stock mount names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Virtual root prefix every mount lives under.
    pub root: String,
    /// Name of the memory mount under the root.
    pub memory_mount: String,
    /// Name of the read-only search mount under the root.
    pub search_mount: String,
    /// Default skill execution timeout in seconds; per-skill overrides win.
    pub skill_timeout_secs: u64,
    /// Capacity of the path-resolution cache.
    pub resolve_cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: "/toolfs".to_owned(),
            memory_mount: "memory".to_owned(),
            search_mount: "rag".to_owned(),
            skill_timeout_secs: 30,
            resolve_cache_capacity: 4096,
        }
    }
}

impl Config {
    /// Parse a TOML document into a configuration.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| Error::InvalidArgument(format!("config: {e}")))?;
        if !config.root.starts_with('/') {
            return Err(Error::InvalidArgument(format!(
                "config: root must be absolute, got {:?}",
                config.root
            )));
        }
        Ok(config)
    }

    /// Full mountpoint of the memory store.
    pub fn memory_mountpoint(&self) -> String {
        format!("{}/{}", self.root, self.memory_mount)
    }

    /// Full mountpoint of the search backend.
    pub fn search_mountpoint(&self) -> String {
        format!("{}/{}", self.root, self.search_mount)
    }

    /// Default skill timeout as a [`Duration`].
    pub fn skill_timeout(&self) -> Duration {
        Duration::from_secs(self.skill_timeout_secs)
    }
}
