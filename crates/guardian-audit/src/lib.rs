//! # guardian-audit
//!
//! Append-only decision audit trail for the Subscription Guardian policy
//! engine.
//!
//! Every evaluation is captured as an [`AuditRecord`] (request, verdict,
//! timestamp) and handed to an [`AuditDispatcher`], which writes it on a
//! background thread so verdict latency never depends on storage latency.
//! The production sink is [`AuditLog`], a hash-chained JSONL file.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use guardian_audit::{AuditDispatcher, AuditLog, AuditRecord};
//!
//! let log = AuditLog::open("/tmp/guardian-audit.jsonl").unwrap();
//! let dispatcher = AuditDispatcher::spawn(log).unwrap();
//! let record = AuditRecord::capture(
//!     "user-1",
//!     &serde_json::json!({"verb": "CANCEL"}),
//!     &serde_json::json!({"effect": "ALLOW"}),
//!     Utc::now(),
//! )
//! .unwrap();
//! dispatcher.submit(record);
//! dispatcher.flush();
//! ```

pub mod alert;
pub mod dispatcher;
pub mod error;
pub mod hasher;
pub mod log;
pub mod record;
pub mod sink;

pub use alert::{AlertChannel, AuditFailure, TracingAlertChannel};
pub use dispatcher::{AuditDispatcher, AuditStats};
pub use error::{error_chain, AuditError};
pub use log::AuditLog;
pub use record::AuditRecord;
pub use sink::{AuditSink, MemoryAuditSink, UnavailableSink};
