// aggregator.rs — Deny-overrides combination of rule outcomes into a Verdict.
//
// Precedence, highest first:
//
// 1. Any matched BLOCK rule          → BLOCK (first one's justification)
// 2. Delegation without a tier grant → BLOCK (delegation guard)
// 3. Any matched ALLOW rule          → ALLOW (first one's justification)
// 4. Nothing matched                 → configured default posture
//
// Deny-overrides is not configurable. The delegation guard sits above ALLOW
// and the default posture, so a delegation can only ever be allowed by a rule
// that explicitly whitelists the delegate's trust tier.

use serde::{Deserialize, Serialize};

use crate::evaluator::RuleOutcome;
use crate::request::{ActionRequest, ActionVerb};
use crate::rule::{Effect, PolicyRule};

/// Verdict used when no rule matches. Deliberately has no `Default`: every
/// deployment states it explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPosture {
    Allow,
    Block,
}

impl DefaultPosture {
    pub fn effect(&self) -> Effect {
        match self {
            DefaultPosture::Allow => Effect::Allow,
            DefaultPosture::Block => Effect::Block,
        }
    }

    fn justification(&self) -> &'static str {
        match self {
            DefaultPosture::Allow => "no applicable policy; defaulting to allow",
            DefaultPosture::Block => "no applicable policy; defaulting to block",
        }
    }
}

/// Why the verdict came out the way it did. For administrators; the end user
/// only sees the justification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBasis {
    /// One or more rules matched.
    Rule,
    /// No rule matched.
    DefaultPosture,
    /// A delegation was blocked for lack of a whitelisted trust tier.
    DelegationGuard,
}

/// The final decision for one request. Contains no timestamps, so evaluating
/// the same request against the same snapshot always yields an equal value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub effect: Effect,
    /// Ids of the rules that produced this effect, highest priority first.
    pub matched_rule_ids: Vec<String>,
    /// Literal text for the end user.
    pub justification: String,
    pub basis: DecisionBasis,
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        self.effect == Effect::Allow
    }

    pub fn is_block(&self) -> bool {
        self.effect == Effect::Block
    }
}

/// Combine `outcomes` (already in priority order) into a verdict.
pub fn aggregate(
    request: &ActionRequest,
    outcomes: &[RuleOutcome<'_>],
    posture: DefaultPosture,
) -> Verdict {
    let blocks = matched(outcomes, Effect::Block);
    if let Some(first) = blocks.first() {
        return Verdict {
            effect: Effect::Block,
            matched_rule_ids: ids(&blocks),
            justification: first.justification.render(request),
            basis: DecisionBasis::Rule,
        };
    }

    let allows = matched(outcomes, Effect::Allow);

    if request.verb.is_delegation() && !delegation_whitelisted(request, &allows) {
        return Verdict {
            effect: Effect::Block,
            matched_rule_ids: Vec::new(),
            justification: delegation_refusal(request),
            basis: DecisionBasis::DelegationGuard,
        };
    }

    if let Some(first) = allows.first() {
        return Verdict {
            effect: Effect::Allow,
            matched_rule_ids: ids(&allows),
            justification: first.justification.render(request),
            basis: DecisionBasis::Rule,
        };
    }

    Verdict {
        effect: posture.effect(),
        matched_rule_ids: Vec::new(),
        justification: posture.justification().to_string(),
        basis: DecisionBasis::DefaultPosture,
    }
}

fn matched<'a>(outcomes: &[RuleOutcome<'a>], effect: Effect) -> Vec<&'a PolicyRule> {
    outcomes
        .iter()
        .filter(|o| o.matched && o.rule.effect == effect)
        .map(|o| o.rule)
        .collect()
}

fn ids(rules: &[&PolicyRule]) -> Vec<String> {
    rules.iter().map(|r| r.id.clone()).collect()
}

/// A delegation passes only with a named delegate, a stated tier, and a
/// matched ALLOW rule whose condition cannot hold without a tier match.
fn delegation_whitelisted(request: &ActionRequest, allows: &[&PolicyRule]) -> bool {
    request.delegate.is_some()
        && request.delegate_tier.is_some()
        && allows.iter().any(|rule| rule.condition.pins_delegate_tier())
}

fn delegation_refusal(request: &ActionRequest) -> String {
    let delegate = request.delegate.as_deref().unwrap_or("unspecified");
    match request.verb {
        ActionVerb::ShareCredential => format!(
            "cannot share credentials with '{}': security policy violation.",
            delegate
        ),
        _ => format!(
            "cannot delegate access to '{}': security policy violation.",
            delegate
        ),
    }
}
