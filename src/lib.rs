//! toolfs - a virtual filesystem router in Rust.
//!
//! Unifies four backends behind one path namespace rooted at a
//! configurable prefix (canonically `/toolfs`): local-disk mounts, an
//! in-process keyed record store, a read-only search store, and
//! dynamically registered executable skills. The [`ToolFs`] facade routes
//! every operation, enforces per-session access control, records audit
//! trails, sandboxes skill execution and supports copy-on-write snapshots
//! of mounted directory trees.

pub mod audit;
pub mod backend;
mod config;
mod error;
pub mod local;
pub mod memory;
pub mod mount;
pub mod path;
mod router;
pub mod search;
pub mod session;
pub mod skill;
pub mod snapshot;

pub use config::Config;
pub use error::{Error, Result};
pub use router::ToolFs;
