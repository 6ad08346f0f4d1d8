#![cfg(test)]

use super::{AuditOperation, AuditRecord, AuditSink, MemoryAuditSink};

#[test]
fn test_record_builder_sets_fields() {
    let record = AuditRecord::new(AuditOperation::ReadFile, "s1", "/toolfs/data/a")
        .success()
        .bytes_read(42);

    assert!(record.success);
    assert!(!record.access_denied);
    assert_eq!(record.bytes_read, Some(42));
    assert_eq!(record.session_id, "s1");
}

#[test]
fn test_denied_record_flags_denial() {
    let record = AuditRecord::new(AuditOperation::WriteFile, "s1", "/toolfs/x").denied();
    assert!(!record.success);
    assert!(record.access_denied);
    assert!(record.error.as_deref().unwrap_or_default().contains("denied"));
}

#[test]
fn test_memory_sink_retains_records() {
    let sink = MemoryAuditSink::new();
    sink.record(AuditRecord::new(AuditOperation::Stat, "s1", "/toolfs/a").success())
        .expect("record");
    sink.record(AuditRecord::new(AuditOperation::Stat, "s1", "/toolfs/b").success())
        .expect("record");

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].path, "/toolfs/b");
}

#[test]
fn test_record_serializes_with_wire_field_names() {
    let record = AuditRecord::new(AuditOperation::ListDir, "s9", "/toolfs/data").success();
    let value = serde_json::to_value(&record).expect("serialize");

    assert_eq!(value["session_id"], "s9");
    assert_eq!(value["operation"], "ListDir");
    assert_eq!(value["access_denied"], false);
    assert!(value.get("bytes_written").is_none());
}
