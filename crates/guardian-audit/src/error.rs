// error.rs — Error types for the audit subsystem.
//
// Each variant maps to a specific failure mode in the audit pipeline. None
// of these ever reach the caller of a policy evaluation: the dispatcher turns
// them into operational alerts. Messages never repeat their source error;
// render the whole chain with `error_chain`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a record to the log.
    #[error("failed to append record")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record (malformed JSON).
    #[error("serialization error")]
    SerializationError(#[from] serde_json::Error),

    /// The audit log has been tampered with; the hash chain is broken.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    /// The sink refused the write (backend down, disk full, etc.).
    #[error("audit sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The background writer thread could not be started or has exited.
    #[error("audit writer is not running: {0}")]
    WriterStopped(String),
}

/// Render an error followed by each of its causes, `outer: inner: root`.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
