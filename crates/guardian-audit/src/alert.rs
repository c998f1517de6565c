// alert.rs — Operational alert channel for audit write failures.
//
// Losing an audit write never changes a verdict, but it is never silent
// either: every failure is pushed through an AlertChannel. The default
// channel emits a `tracing` error on the `guardian::ops_alert` target so
// log shippers can route it to paging.

use serde::Serialize;
use uuid::Uuid;

/// Details of a failed audit write.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditFailure {
    /// Record that could not be persisted (None if it was never built).
    pub record_id: Option<Uuid>,
    /// Actor of the evaluation whose record was lost.
    pub actor_id: String,
    /// Which sink failed (log path, "memory", ...).
    pub sink: String,
    /// Rendered error.
    pub error: String,
    /// Failures in a row, reset by the next successful write.
    pub consecutive_failures: u64,
}

/// Receives audit failures for escalation.
pub trait AlertChannel: Send + Sync {
    fn audit_write_failed(&self, failure: &AuditFailure);
}

/// Default channel: structured `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertChannel;

impl AlertChannel for TracingAlertChannel {
    fn audit_write_failed(&self, failure: &AuditFailure) {
        tracing::error!(
            target: "guardian::ops_alert",
            record_id = ?failure.record_id,
            actor = %failure.actor_id,
            sink = %failure.sink,
            consecutive_failures = failure.consecutive_failures,
            "audit write failed: {}",
            failure.error
        );
    }
}
