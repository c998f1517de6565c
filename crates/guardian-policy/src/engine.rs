// engine.rs — Policy decision engine.
//
// The PolicyEngine is the single chokepoint every agent action passes through:
//
// 1. Normalize the payload           → MalformedRequest on failure (no verdict)
// 2. Take the current snapshot       → one Arc clone, no lock held afterwards
// 3. Evaluate every applicable rule  → ordered (rule, matched) outcomes
// 4. Aggregate (deny-overrides)      → Verdict
// 5. Hand the evaluation to audit    → asynchronous, never affects step 4
//
// A false ALLOW is the one outcome this engine must never produce, which is
// why BLOCK always wins and delegation is blocked unless explicitly granted.

use std::path::Path;

use chrono::{DateTime, Utc};
use guardian_audit::{AuditDispatcher, AuditRecord, AuditStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregator::{aggregate, DefaultPosture, Verdict};
use crate::error::PolicyError;
use crate::evaluator::evaluate_rules;
use crate::normalizer::{normalize, validate};
use crate::request::ActionRequest;
use crate::rule::{Effect, RuleSet};
use crate::store::PolicyStore;

/// One rule the engine considered while deciding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleCheck {
    pub rule_id: String,
    pub effect: Effect,
    pub priority: i64,
    pub matched: bool,
}

/// Verdict plus everything that led to it.
///
/// Records which snapshot was used and every applicable rule in evaluation
/// order, so administrators can see exactly why a request was blocked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationTrace {
    /// The final decision.
    pub verdict: Verdict,
    /// Version of the policy snapshot evaluated against.
    pub snapshot_version: u64,
    /// Applicable rules, highest priority first.
    pub rules: Vec<RuleCheck>,
}

/// The policy engine: evaluates action requests against the active ruleset.
pub struct PolicyEngine {
    store: PolicyStore,
    posture: DefaultPosture,
    audit: Option<AuditDispatcher>,
}

impl PolicyEngine {
    /// Create an engine with an empty ruleset. Until policies are loaded,
    /// every non-delegation request gets `posture`.
    pub fn new(posture: DefaultPosture) -> Self {
        Self {
            store: PolicyStore::new(),
            posture,
            audit: None,
        }
    }

    /// Attach an audit dispatcher. Every verdict is recorded through it.
    pub fn with_audit(mut self, audit: AuditDispatcher) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace the active ruleset. All-or-nothing; see [`PolicyStore::load`].
    pub fn load_policies(&self, ruleset: &RuleSet) -> Result<(), PolicyError> {
        self.store.load(ruleset).map(|_| ())
    }

    /// Replace the active ruleset from a YAML file.
    pub fn load_policy_file(&self, path: impl AsRef<Path>) -> Result<(), PolicyError> {
        self.store.load_file(path).map(|_| ())
    }

    /// Evaluate a raw orchestrator payload.
    ///
    /// Returns `MalformedRequest` when the payload cannot be normalized; that
    /// outcome is neither ALLOW nor BLOCK and is not audited.
    pub fn evaluate(&self, payload: &Value) -> Result<Verdict, PolicyError> {
        let request = normalize(payload).map_err(rejected)?;
        self.evaluate_request(&request)
    }

    /// Evaluate a request built in code rather than normalized from a
    /// payload. It is checked the same way `normalize` checks payloads.
    pub fn evaluate_request(&self, request: &ActionRequest) -> Result<Verdict, PolicyError> {
        self.evaluate_with_trace(request).map(|trace| trace.verdict)
    }

    /// Evaluate and return the verdict with a full trace.
    ///
    /// Same logic as `evaluate_request()`; the verdict is audited once.
    pub fn evaluate_with_trace(
        &self,
        request: &ActionRequest,
    ) -> Result<EvaluationTrace, PolicyError> {
        validate(request).map_err(rejected)?;

        let snapshot = self.store.snapshot();
        let evaluated_at = Utc::now();

        let applicable = snapshot.rules_for_at(request.verb, request.category, evaluated_at);
        let outcomes = evaluate_rules(request, &applicable);
        let verdict = aggregate(request, &outcomes, self.posture);

        let rules = outcomes
            .iter()
            .map(|o| RuleCheck {
                rule_id: o.rule.id.clone(),
                effect: o.rule.effect,
                priority: o.rule.priority,
                matched: o.matched,
            })
            .collect();

        tracing::info!(
            actor = %request.actor,
            verb = %request.verb,
            effect = ?verdict.effect,
            basis = ?verdict.basis,
            matched = ?verdict.matched_rule_ids,
            snapshot = snapshot.version(),
            "action evaluated"
        );

        self.record(request, &verdict, snapshot.version(), evaluated_at);

        Ok(EvaluationTrace {
            verdict,
            snapshot_version: snapshot.version(),
            rules,
        })
    }

    /// The store backing this engine.
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn posture(&self) -> DefaultPosture {
        self.posture
    }

    /// Audit health counters, if auditing is enabled.
    pub fn audit_stats(&self) -> Option<AuditStats> {
        self.audit.as_ref().map(AuditDispatcher::stats)
    }

    /// Wait for every verdict evaluated so far to reach the audit sink.
    pub fn flush_audit(&self) {
        if let Some(audit) = &self.audit {
            audit.flush();
        }
    }

    fn record(
        &self,
        request: &ActionRequest,
        verdict: &Verdict,
        snapshot_version: u64,
        evaluated_at: DateTime<Utc>,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };
        match AuditRecord::capture(request.actor.as_str(), request, verdict, evaluated_at) {
            Ok(record) => audit.submit(record.with_snapshot_version(snapshot_version)),
            Err(e) => audit.report_failure(&request.actor, &e),
        }
    }
}

fn rejected(error: PolicyError) -> PolicyError {
    tracing::warn!(error = %error, "rejecting malformed action request");
    error
}
