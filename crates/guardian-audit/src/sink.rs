// sink.rs — The AuditSink trait and an in-memory implementation.
//
// A sink is anything that can durably append an AuditRecord. The JSONL
// `AuditLog` is the production sink; `MemoryAuditSink` backs tests and
// embedders that ship records elsewhere themselves. `UnavailableSink` stands
// in for a sink that could not be opened, so every lost record is still
// counted and alerted.

use std::sync::{Arc, Mutex};

use crate::error::{error_chain, AuditError};
use crate::hasher;
use crate::record::AuditRecord;

/// An append-only destination for audit records.
///
/// `append` takes `&mut AuditRecord` so the sink can stamp chain fields
/// (`previous_hash`) before persisting. Sinks are driven from the
/// dispatcher's writer thread, hence the `Send` bound.
pub trait AuditSink: Send {
    /// Append one record. Records are never updated or deleted afterwards.
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError>;

    /// Short label used in operational alerts (e.g. the log path).
    fn describe(&self) -> String;
}

/// In-memory sink. Clones share the same buffer, so a test can hand one
/// clone to the dispatcher and read records through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records appended so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| AuditError::SinkUnavailable("memory sink lock poisoned".to_string()))?;
        record.previous_hash = match guard.last() {
            Some(last) => Some(hasher::hash_str(&serde_json::to_string(last)?)),
            None => None,
        };
        guard.push(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Sink that refuses every write with the reason it could not be opened.
#[derive(Debug, Clone)]
pub struct UnavailableSink {
    label: String,
    reason: String,
}

impl UnavailableSink {
    pub fn new(label: impl Into<String>, cause: &AuditError) -> Self {
        Self {
            label: label.into(),
            reason: error_chain(cause),
        }
    }
}

impl AuditSink for UnavailableSink {
    fn append(&mut self, _record: &mut AuditRecord) -> Result<(), AuditError> {
        Err(AuditError::SinkUnavailable(self.reason.clone()))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
