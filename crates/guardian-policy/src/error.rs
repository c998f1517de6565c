// error.rs — Error types for the policy subsystem.
//
// Only two errors ever reach callers of the engine: a request that cannot be
// normalized, and a ruleset that cannot be loaded. Rule evaluation and
// aggregation are total and have no error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The request payload could not be normalized into an ActionRequest.
    /// Callers must neither execute nor treat this as a BLOCK verdict.
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// One or more rules failed validation. The previous snapshot stays active.
    #[error("invalid policy: rule(s) {} rejected: {}", rule_ids.join(", "), problems.join("; "))]
    InvalidPolicy {
        /// Every offending rule id, each once, in ruleset order.
        rule_ids: Vec<String>,
        /// Human-readable problems, prefixed with the rule id.
        problems: Vec<String>,
    },

    /// The ruleset file could not be read.
    #[error("failed to read policy file at {path}")]
    PolicyFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ruleset document is not valid YAML or lacks the `rules` list.
    #[error("failed to parse ruleset")]
    PolicyParse(#[from] serde_yaml::Error),

    /// The ruleset could not be fingerprinted.
    #[error("failed to serialize ruleset")]
    Serialization(#[from] serde_json::Error),
}

impl PolicyError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PolicyError::MalformedRequest {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while loading `guardian.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or is missing a required key
    /// (notably `default_posture`).
    #[error("invalid config")]
    Parse(#[from] toml::de::Error),
}
