// rule.rs — Policy rule schema and load-time validation.
//
// Rules arrive as loosely typed `RuleDefinition`s (straight from YAML) and
// are validated one by one into `PolicyRule`s. Keeping the raw form lets a
// bad effect or a malformed condition be reported against the rule id that
// carries it, instead of failing the whole document parse.
//
// Conditions are a closed tagged enum. Every kind is evaluated by the single
// dispatcher in `evaluator.rs`; there is no per-rule-type trait object.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::request::{ActionVerb, Category};
use crate::template::JustificationTemplate;

/// Conditions nest at most this deep; deeper trees are rejected at load.
pub const MAX_CONDITION_DEPTH: usize = 16;

/// What a matched rule asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    Allow,
    Block,
}

impl Effect {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Some(Effect::Allow),
            "BLOCK" => Some(Effect::Block),
            _ => None,
        }
    }
}

/// Which requests a rule is even considered for. An empty set matches any
/// verb (or any category).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Applicability {
    pub verbs: BTreeSet<ActionVerb>,
    pub categories: BTreeSet<Category>,
}

impl Applicability {
    pub fn matches(&self, verb: ActionVerb, category: Category) -> bool {
        (self.verbs.is_empty() || self.verbs.contains(&verb))
            && (self.categories.is_empty() || self.categories.contains(&category))
    }
}

/// Comparison operators for `Condition::Attribute`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
}

impl CompareOp {
    fn is_ordering(&self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le)
    }
}

/// A boolean expression over request attributes.
///
/// In YAML:
/// ```yaml
/// condition:
///   kind: all
///   conditions:
///     - { kind: category_in, categories: [ENTERTAINMENT] }
///     - { kind: amount_at_most, threshold: 20 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Condition {
    /// Matches every applicable request.
    Always,
    CategoryIn { categories: Vec<Category> },
    /// Monthly amount strictly greater than `threshold`. False without an amount.
    AmountAbove { threshold: Decimal },
    /// Monthly amount at most `threshold`. False without an amount.
    AmountAtMost { threshold: Decimal },
    /// Target name equals one of `targets`, ignoring case.
    TargetIn { targets: Vec<String> },
    /// Target name matches one of the glob `patterns`, ignoring case.
    TargetMatches { patterns: Vec<String> },
    DelegateIn { delegates: Vec<String> },
    /// Delegate trust tier is one of `tiers`. This is the only condition that
    /// can whitelist a delegation.
    DelegateTierIn { tiers: Vec<String> },
    /// Generic comparison against a first-class or raw-context attribute.
    Attribute {
        field: String,
        op: CompareOp,
        value: serde_json::Value,
    },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    /// True when every way this condition can hold requires the delegate's
    /// trust tier to be on an explicit list.
    pub fn pins_delegate_tier(&self) -> bool {
        match self {
            Condition::DelegateTierIn { .. } => true,
            Condition::All { conditions } => conditions.iter().any(Condition::pins_delegate_tier),
            Condition::Any { conditions } => {
                !conditions.is_empty() && conditions.iter().all(Condition::pins_delegate_tier)
            }
            _ => false,
        }
    }

    fn validate(&self, depth: usize, problems: &mut Vec<String>) {
        if depth > MAX_CONDITION_DEPTH {
            problems.push(format!(
                "condition nests deeper than {} levels",
                MAX_CONDITION_DEPTH
            ));
            return;
        }

        match self {
            Condition::Always => {}
            Condition::CategoryIn { categories } => {
                require_non_empty(categories.is_empty(), "category_in", "categories", problems)
            }
            Condition::AmountAbove { threshold } | Condition::AmountAtMost { threshold } => {
                if threshold.is_sign_negative() && !threshold.is_zero() {
                    problems.push(format!("amount threshold {} is negative", threshold));
                }
            }
            Condition::TargetIn { targets } => {
                require_non_empty(targets.is_empty(), "target_in", "targets", problems)
            }
            Condition::TargetMatches { patterns } => {
                require_non_empty(patterns.is_empty(), "target_matches", "patterns", problems);
                for pattern in patterns {
                    if let Err(e) = glob::Pattern::new(pattern) {
                        problems.push(format!("invalid target pattern '{}': {}", pattern, e.msg));
                    }
                }
            }
            Condition::DelegateIn { delegates } => {
                require_non_empty(delegates.is_empty(), "delegate_in", "delegates", problems)
            }
            Condition::DelegateTierIn { tiers } => {
                require_non_empty(tiers.is_empty(), "delegate_tier_in", "tiers", problems)
            }
            Condition::Attribute { field, op, value } => {
                if field.trim().is_empty() {
                    problems.push("attribute condition has an empty field name".to_string());
                }
                match op {
                    CompareOp::In | CompareOp::NotIn => {
                        if !value.is_array() {
                            problems.push(format!("operator '{:?}' needs a list value", op));
                        }
                    }
                    op if op.is_ordering() => {
                        let numeric = match value {
                            serde_json::Value::Number(_) => true,
                            serde_json::Value::String(s) => {
                                crate::request::parse_decimal(s).is_some()
                            }
                            _ => false,
                        };
                        if !numeric {
                            problems.push(format!("operator '{:?}' needs a numeric value", op));
                        }
                    }
                    _ => {
                        if value.is_array() || value.is_object() || value.is_null() {
                            problems.push(format!("operator '{:?}' needs a scalar value", op));
                        }
                    }
                }
            }
            Condition::All { conditions } | Condition::Any { conditions } => {
                if conditions.is_empty() {
                    problems.push("all/any condition has no sub-conditions".to_string());
                }
                for condition in conditions {
                    condition.validate(depth + 1, problems);
                }
            }
            Condition::Not { condition } => condition.validate(depth + 1, problems),
        }
    }
}

fn require_non_empty(empty: bool, kind: &str, list: &str, problems: &mut Vec<String>) {
    if empty {
        problems.push(format!("{} condition has an empty '{}' list", kind, list));
    }
}

/// A rule exactly as authored, before validation.
///
/// Everything is optional or stringly typed on purpose: validation reports
/// problems per rule id rather than rejecting the document wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub verbs: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Omitted condition means `always`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub justification: String,
    /// RFC 3339 instant after which the rule no longer applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// A complete ruleset document.
///
/// ```yaml
/// rules:
///   - id: utility-cancel-blocked
///     verbs: [CANCEL]
///     categories: [UTILITY]
///     effect: BLOCK
///     priority: 100
///     justification: "cannot cancel {target}; it is flagged as a critical utility."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    /// Parse a YAML ruleset document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// A validated, immutable policy rule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PolicyRule {
    pub id: String,
    pub applies_to: Applicability,
    pub condition: Condition,
    pub effect: Effect,
    /// Higher priority is evaluated and reported first.
    pub priority: i64,
    pub justification: JustificationTemplate,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PolicyRule {
    /// Validate a definition. On failure returns every problem found.
    pub fn from_definition(def: &RuleDefinition) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();

        if def.id.trim().is_empty() {
            problems.push("rule id is empty".to_string());
        }

        let mut verbs = BTreeSet::new();
        for raw in &def.verbs {
            match ActionVerb::parse(raw) {
                Some(verb) => {
                    verbs.insert(verb);
                }
                None => problems.push(format!("unknown verb '{}'", raw)),
            }
        }

        let mut categories = BTreeSet::new();
        for raw in &def.categories {
            match Category::parse(raw) {
                Some(category) => {
                    categories.insert(category);
                }
                None => problems.push(format!("unknown category '{}'", raw)),
            }
        }

        let effect = Effect::parse(&def.effect);
        if effect.is_none() {
            problems.push(format!(
                "effect must be ALLOW or BLOCK (got '{}')",
                def.effect
            ));
        }

        let condition = match &def.condition {
            None => Some(Condition::Always),
            Some(raw) => match serde_json::from_value::<Condition>(raw.clone()) {
                Ok(condition) => {
                    condition.validate(1, &mut problems);
                    Some(condition)
                }
                Err(e) => {
                    problems.push(format!("malformed condition: {}", e));
                    None
                }
            },
        };

        let justification = match JustificationTemplate::parse(&def.justification) {
            Ok(template) => Some(template),
            Err(mut template_problems) => {
                problems.append(&mut template_problems);
                None
            }
        };

        let expires_at = match &def.expires_at {
            None => None,
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(e) => {
                    problems.push(format!("expires_at '{}' is not RFC 3339: {}", raw, e));
                    None
                }
            },
        };

        match (effect, condition, justification) {
            (Some(effect), Some(condition), Some(justification)) if problems.is_empty() => {
                Ok(PolicyRule {
                    id: def.id.trim().to_string(),
                    applies_to: Applicability { verbs, categories },
                    condition,
                    effect,
                    priority: def.priority,
                    justification,
                    expires_at,
                })
            }
            _ => Err(problems),
        }
    }

    /// Whether the rule is in force at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| now <= expiry)
    }
}
