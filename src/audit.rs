//! Audit records and sinks.
//!
//! Every public filesystem operation performed in the scope of a session
//! emits exactly one record, whether it succeeded, failed, or was denied.
//! Records are immutable once emitted. A failing sink is logged with a
//! warning and never vetoes the operation it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Operation classes carried in audit records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOperation {
    ReadFile,
    WriteFile,
    ListDir,
    Stat,
    SkillExecute,
    ExecuteCommand,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub operation: AuditOperation,
    pub path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    pub access_denied: bool,
}

impl AuditRecord {
    /// Start a record for `operation` on `path` in session `session_id`.
    pub fn new(operation: AuditOperation, session_id: &str, path: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_owned(),
            operation,
            path: path.to_owned(),
            success: false,
            error: None,
            bytes_read: None,
            bytes_written: None,
            access_denied: false,
        }
    }

    pub fn success(mut self) -> Self {
        self.success = true;
        self
    }

    pub fn failure(mut self, error: &crate::Error) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    pub fn denied(mut self) -> Self {
        self.success = false;
        self.access_denied = true;
        self.error = Some(format!("access denied: {}", self.path));
        self
    }

    pub fn bytes_read(mut self, n: u64) -> Self {
        self.bytes_read = Some(n);
        self
    }

    pub fn bytes_written(mut self, n: u64) -> Self {
        self.bytes_written = Some(n);
        self
    }
}

/// Write-only destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Persist one record. Errors are reported to the caller, which logs
    /// them and continues; emission never fails the audited operation.
    fn record(&self, record: AuditRecord) -> std::result::Result<(), String>;
}

/// Emit a record into `sink`, downgrading sink failures to a warning.
pub fn emit(sink: &dyn AuditSink, record: AuditRecord) {
    if let Err(err) = sink.record(record) {
        warn!(error = %err, "audit sink rejected record");
    }
}

/// Sink that retains records in memory, mainly for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: std::sync::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record emitted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit sink poisoned").clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) -> std::result::Result<(), String> {
        self.records.lock().map_err(|e| e.to_string())?.push(record);
        Ok(())
    }
}

/// Sink that forwards records to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> std::result::Result<(), String> {
        info!(
            target: "toolfs::audit",
            session = %record.session_id,
            operation = ?record.operation,
            path = %record.path,
            success = record.success,
            access_denied = record.access_denied,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests;
