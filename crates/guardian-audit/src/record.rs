// record.rs — Audit record data model.
//
// Every policy evaluation is recorded as an AuditRecord: the normalized
// request, the verdict handed back to the orchestrator, and the instant the
// verdict was produced. Records form a chain: each one carries a
// `previous_hash` linking it to the prior record, enabling tamper detection.
//
// The request and verdict are stored as JSON values so this crate does not
// depend on the policy engine's types; `request_as` / `verdict_as` decode them
// back for review tooling.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

/// A single audit record, one line in the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    /// Unique identifier for this record.
    pub record_id: Uuid,

    /// When the verdict was produced (UTC).
    pub timestamp: DateTime<Utc>,

    /// Who issued the evaluated request (end user or delegated party).
    pub actor_id: String,

    /// The normalized action request, archived verbatim.
    pub request: serde_json::Value,

    /// The verdict returned to the orchestrator, archived verbatim.
    pub verdict: serde_json::Value,

    /// Version of the policy snapshot the request was evaluated against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,

    /// Hash of the previous record in the log (for tamper detection).
    /// The first record in a log has this set to None.
    pub previous_hash: Option<String>,
}

impl AuditRecord {
    /// Capture an evaluation as a record with a fresh random id.
    pub fn capture<R, V>(
        actor_id: impl Into<String>,
        request: &R,
        verdict: &V,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, AuditError>
    where
        R: Serialize,
        V: Serialize,
    {
        Ok(Self {
            record_id: Uuid::new_v4(),
            timestamp,
            actor_id: actor_id.into(),
            request: serde_json::to_value(request)?,
            verdict: serde_json::to_value(verdict)?,
            snapshot_version: None,
            previous_hash: None,
        })
    }

    /// Set the policy snapshot version and return self.
    pub fn with_snapshot_version(mut self, version: u64) -> Self {
        self.snapshot_version = Some(version);
        self
    }

    /// Decode the archived request back into a typed value.
    pub fn request_as<T: DeserializeOwned>(&self) -> Result<T, AuditError> {
        Ok(serde_json::from_value(self.request.clone())?)
    }

    /// Decode the archived verdict back into a typed value.
    pub fn verdict_as<T: DeserializeOwned>(&self) -> Result<T, AuditError> {
        Ok(serde_json::from_value(self.verdict.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capture_keeps_request_and_verdict_verbatim() {
        let request = json!({"actor": "user-1", "verb": "CANCEL", "target": "Netflix"});
        let verdict = json!({"effect": "ALLOW", "justification": "ok"});
        let record = AuditRecord::capture("user-1", &request, &verdict, Utc::now()).unwrap();

        assert_eq!(record.actor_id, "user-1");
        assert_eq!(record.request, request);
        assert_eq!(record.verdict, verdict);
        assert!(record.previous_hash.is_none());
        assert!(record.snapshot_version.is_none());
    }

    #[test]
    fn record_ids_are_unique() {
        let now = Utc::now();
        let r1 = AuditRecord::capture("a", &json!({}), &json!({}), now).unwrap();
        let r2 = AuditRecord::capture("a", &json!({}), &json!({}), now).unwrap();
        assert_ne!(r1.record_id, r2.record_id);
    }

    #[test]
    fn typed_decode_of_archived_verdict() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Summary {
            effect: String,
        }

        let record =
            AuditRecord::capture("a", &json!({}), &json!({"effect": "BLOCK"}), Utc::now())
                .unwrap()
                .with_snapshot_version(4);
        let summary: Summary = record.verdict_as().unwrap();
        assert_eq!(summary.effect, "BLOCK");
        assert_eq!(record.snapshot_version, Some(4));
    }

    #[test]
    fn snapshot_version_omitted_when_absent() {
        let record = AuditRecord::capture("a", &json!({}), &json!({}), Utc::now()).unwrap();
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains("snapshot_version"));
    }
}
