// crates/exam-catalog-core/src/runtime/audit.rs
// ============================================================================
// Module: Exam Catalog Write Audit
// Description: Structured audit events for catalog mutations.
// Purpose: Record every write attempt outcome without hard dependencies.
// Dependencies: serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Each write the service executes produces one [`WriteAuditEvent`] naming
//! the operation, the resource, the outcome, and how many attempts the
//! retry loop used. Sinks decide where the event goes: the tracing pipeline,
//! an append-only JSON lines file, or nowhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::interfaces::ResourceKind;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of an audited write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Transaction committed.
    Committed,
    /// Write rejected or rolled back.
    Failed,
}

/// Write audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct WriteAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Operation label, e.g. `update_subject`.
    pub operation: &'static str,
    /// Resource written.
    pub resource: ResourceKind,
    /// Raw id of the written entity when known.
    pub id: Option<u64>,
    /// Write outcome.
    pub outcome: AuditOutcome,
    /// Error code when the write failed.
    pub error_code: Option<&'static str>,
    /// Store attempts made, including the first.
    pub attempts: u32,
    /// Wall time spent on the write.
    pub elapsed_ms: u64,
}

/// Inputs required to construct a write audit event.
pub struct WriteAuditEventParams {
    /// Operation label.
    pub operation: &'static str,
    /// Resource written.
    pub resource: ResourceKind,
    /// Raw id of the written entity when known.
    pub id: Option<u64>,
    /// Write outcome.
    pub outcome: AuditOutcome,
    /// Error code when the write failed.
    pub error_code: Option<&'static str>,
    /// Store attempts made.
    pub attempts: u32,
    /// Wall time spent on the write.
    pub elapsed_ms: u64,
}

impl WriteAuditEvent {
    /// Creates a new audit event stamped with the current time.
    #[must_use]
    pub fn new(params: WriteAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "catalog_write",
            timestamp_ms,
            operation: params.operation,
            resource: params.resource,
            id: params.id,
            outcome: params.outcome,
            error_code: params.error_code,
            attempts: params.attempts,
            elapsed_ms: params.elapsed_ms,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for catalog writes.
pub trait WriteAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &WriteAuditEvent);
}

/// Audit sink that forwards events to the tracing pipeline.
pub struct TracingAuditSink;

impl WriteAuditSink for TracingAuditSink {
    fn record(&self, event: &WriteAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            tracing::info!(target: "exam_catalog::audit", %payload, "catalog write");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl WriteAuditSink for FileAuditSink {
    fn record(&self, event: &WriteAuditEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
        }
    }
}

/// Audit sink that drops events.
pub struct NoopAuditSink;

impl WriteAuditSink for NoopAuditSink {
    fn record(&self, _event: &WriteAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Tests use expect on temp file fixtures.")]

    use super::*;

    fn sample(outcome: AuditOutcome) -> WriteAuditEvent {
        WriteAuditEvent::new(WriteAuditEventParams {
            operation: "update_subject",
            resource: ResourceKind::Subject,
            id: Some(9),
            outcome,
            error_code: None,
            attempts: 2,
            elapsed_ms: 15,
        })
    }

    #[test]
    fn event_serializes_with_snake_case_labels() {
        let value = serde_json::to_value(sample(AuditOutcome::Committed)).unwrap_or_default();
        assert_eq!(value["event"], "catalog_write");
        assert_eq!(value["resource"], "subject");
        assert_eq!(value["outcome"], "committed");
        assert_eq!(value["attempts"], 2);
    }

    #[test]
    fn file_sink_appends_one_line_per_event() {
        let dir = std::env::temp_dir().join(format!("exam-catalog-audit-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("audit.jsonl");
        let _ = std::fs::remove_file(&path);
        let sink = FileAuditSink::new(&path).expect("open audit file");
        sink.record(&sample(AuditOutcome::Committed));
        sink.record(&sample(AuditOutcome::Failed));
        let contents = std::fs::read_to_string(&path).expect("read audit file");
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"outcome\":\"failed\""));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
