//! Dynamically registered executable skills.
//!
//! A skill is a named, init-then-execute unit addressed through a JSON
//! request/response contract. Filesystem skills bind a host directory with
//! a descriptor document; code skills bind an executor object; builtin
//! skills expose the memory and search backends through the same contract.

mod builtin;
mod dispatcher;
mod loader;
mod manager;
mod registry;
mod sandbox;

pub use builtin::{MemorySkillExecutor, SearchSkillExecutor};
pub use dispatcher::SkillDispatcher;
pub use loader::{load_filesystem_skill, FsSkillExecutor};
pub use manager::{LoadOptions, ManagedSkill, SkillManager};
pub use registry::SkillRegistry;
pub use sandbox::{
    Sandbox, SandboxOutput, SandboxPolicy, Violation, VIOLATION_CPU_TIMEOUT, VIOLATION_HOST_FS,
    VIOLATION_MEMORY_LIMIT, VIOLATION_SYSTEM_PATH,
};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::MemoryStore;
use crate::search::SearchIndex;
use crate::Result;

/// Operation names carried on the wire by the dispatcher.
pub const OP_READ_FILE: &str = "read_file";
pub const OP_WRITE_FILE: &str = "write_file";
pub const OP_LIST_DIR: &str = "list_dir";

/// How a skill is backed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillKind {
    /// A host directory carrying a descriptor document.
    Filesystem,
    /// An executor object supplied by the embedder.
    Code,
    /// The memory or search backend behind the executor contract.
    Builtin,
}

/// Documentation extracted from a skill's descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkillDocs {
    pub description: String,
    pub body: String,
}

/// A registered skill.
#[derive(Clone)]
pub struct Skill {
    pub name: String,
    pub version: String,
    pub kind: SkillKind,
    /// Preferred mountpoint, when the skill ships one.
    pub mount_path: Option<String>,
    pub docs: Option<SkillDocs>,
    pub executor: Option<Arc<dyn SkillExecutor>>,
}

impl Skill {
    /// A code skill around `executor`.
    pub fn code(name: &str, version: &str, executor: Arc<dyn SkillExecutor>) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            kind: SkillKind::Code,
            mount_path: None,
            docs: None,
            executor: Some(executor),
        }
    }

    /// A builtin skill around `executor`.
    pub fn builtin(name: &str, executor: Arc<dyn SkillExecutor>) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            kind: SkillKind::Builtin,
            mount_path: None,
            docs: None,
            executor: Some(executor),
        }
    }
}

impl std::fmt::Debug for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("mount_path", &self.mount_path)
            .finish_non_exhaustive()
    }
}

/// JSON request handed to a skill's executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillRequest {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl SkillRequest {
    pub fn new(operation: &str) -> Self {
        Self { operation: operation.to_owned(), ..Self::default() }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// A string field out of `data`.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

/// JSON response produced by a skill's executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SkillResponse {
    pub fn ok(result: Value) -> Self {
        Self { success: true, result: Some(result), error: None, metadata: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(message.into()), metadata: None }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-skill execution context bound at load time.
///
/// Gives executors gated access to the virtual backends and carries the
/// per-invocation plumbing: stdio capture buffers, the cooperative
/// cancellation flag set when a timeout fires, and advisory memory
/// accounting.
pub struct SkillContext {
    pub skill_name: String,
    memory: Option<Arc<MemoryStore>>,
    search: Option<Arc<dyn SearchIndex>>,
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
    cancelled: AtomicBool,
    memory_used: AtomicU64,
}

impl SkillContext {
    pub fn new(skill_name: &str) -> Self {
        Self {
            skill_name: skill_name.to_owned(),
            memory: None,
            search: None,
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            memory_used: AtomicU64::new(0),
        }
    }

    pub fn with_memory(mut self, store: Arc<MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn with_search(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(index);
        self
    }

    pub fn memory(&self) -> Option<&Arc<MemoryStore>> {
        self.memory.as_ref()
    }

    pub fn search(&self) -> Option<&Arc<dyn SearchIndex>> {
        self.search.as_ref()
    }

    /// Append to the captured stdout stream.
    pub fn write_stdout(&self, text: &str) {
        self.stdout.lock().expect("stdout buffer poisoned").extend_from_slice(text.as_bytes());
    }

    /// Append to the captured stderr stream.
    pub fn write_stderr(&self, text: &str) {
        self.stderr.lock().expect("stderr buffer poisoned").extend_from_slice(text.as_bytes());
    }

    /// Whether the current invocation was cancelled by a timeout.
    /// Well-behaved executors check this before mutating shared state;
    /// late-arriving writes are otherwise not rolled back.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Report advisory memory usage for the current invocation.
    pub fn report_memory_used(&self, bytes: u64) {
        self.memory_used.fetch_max(bytes, Ordering::AcqRel);
    }

    pub(crate) fn set_cancelled(&self, value: bool) {
        self.cancelled.store(value, Ordering::Release);
    }

    pub(crate) fn take_stdout(&self) -> String {
        let mut buf = self.stdout.lock().expect("stdout buffer poisoned");
        String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned()
    }

    pub(crate) fn take_stderr(&self) -> String {
        let mut buf = self.stderr.lock().expect("stderr buffer poisoned");
        String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned()
    }

    pub(crate) fn take_memory_used(&self) -> u64 {
        self.memory_used.swap(0, Ordering::AcqRel)
    }

    /// Reset per-invocation state before an execution starts.
    pub(crate) fn reset(&self) {
        self.set_cancelled(false);
        self.take_stdout();
        self.take_stderr();
        self.take_memory_used();
    }
}

impl std::fmt::Debug for SkillContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillContext")
            .field("skill_name", &self.skill_name)
            .field("has_memory", &self.memory.is_some())
            .field("has_search", &self.search.is_some())
            .finish_non_exhaustive()
    }
}

/// The init-then-execute contract every skill backend implements.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    /// One-time setup when the skill is loaded.
    async fn init(&self, _ctx: &SkillContext) -> Result<()> {
        Ok(())
    }

    /// Handle one request. Failures are reported inside the response;
    /// returning is always expected — panics are caught by the manager.
    async fn execute(&self, ctx: Arc<SkillContext>, request: SkillRequest) -> SkillResponse;
}

#[cfg(test)]
mod tests;
