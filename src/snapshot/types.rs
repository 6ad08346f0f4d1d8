//! Snapshot data model.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a captured entry relates to the snapshot's base chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SnapshotOp {
    Created,
    Modified,
    Deleted,
    Unchanged,
}

/// One captured entry. Directories are captured by presence only.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    /// Full virtual path of the entry.
    pub path: String,
    pub content: Vec<u8>,
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_dir: bool,
    pub op: SnapshotOp,
}

/// Mutation classes recorded in a snapshot's change log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Write,
    Delete,
}

/// Append-only audit entry describing one tracked mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub path: String,
    pub op: ChangeOp,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Aggregate statistics computed from captured files only.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub file_count: usize,
}

/// An immutable copy-on-write capture of the writable local mounts.
///
/// Everything but the change log is frozen at creation; the log is
/// append-only audit data that restore never consults.
pub struct Snapshot {
    name: String,
    meta: SnapshotMeta,
    files: HashMap<String, FileSnapshot>,
    changes: Mutex<Vec<ChangeRecord>>,
    base: Option<std::sync::Arc<Snapshot>>,
}

impl Snapshot {
    pub(crate) fn new(
        name: String,
        meta: SnapshotMeta,
        files: HashMap<String, FileSnapshot>,
        base: Option<std::sync::Arc<Snapshot>>,
    ) -> Self {
        Self { name, meta, files, changes: Mutex::new(Vec::new()), base }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// Captured entries keyed by virtual path.
    pub fn files(&self) -> &HashMap<String, FileSnapshot> {
        &self.files
    }

    /// The snapshot this one captures deltas against.
    pub fn base(&self) -> Option<&std::sync::Arc<Snapshot>> {
        self.base.as_ref()
    }

    /// Copy of the change log.
    pub fn changes(&self) -> Vec<ChangeRecord> {
        self.changes.lock().expect("change log poisoned").clone()
    }

    pub(crate) fn append_change(&self, record: ChangeRecord) {
        self.changes.lock().expect("change log poisoned").push(record);
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .field("files", &self.files.len())
            .field("base", &self.base.as_ref().map(|b| b.name.clone()))
            .finish_non_exhaustive()
    }
}
