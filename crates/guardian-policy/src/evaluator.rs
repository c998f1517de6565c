// evaluator.rs — Applies rule conditions to a request.
//
// Evaluation is pure and total, and three-valued underneath: a condition that
// cannot be decided (a missing attribute, a null amount, a value of the wrong
// type) is unknown rather than false. `not` leaves unknown as unknown, and a
// rule fires only when its condition is definitely true. Nothing here returns
// an error.

use glob::{MatchOptions, Pattern};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::request::{decimal_from_number, parse_decimal, ActionRequest, Attribute};
use crate::rule::{CompareOp, Condition, PolicyRule};

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// One rule's outcome against one request.
#[derive(Debug, Clone, Copy)]
pub struct RuleOutcome<'a> {
    pub rule: &'a PolicyRule,
    pub matched: bool,
}

/// Evaluate `rules` in the given order. Every rule yields an outcome; none
/// depends on another's result.
pub fn evaluate_rules<'a>(
    request: &ActionRequest,
    rules: &[&'a PolicyRule],
) -> Vec<RuleOutcome<'a>> {
    rules
        .iter()
        .map(|rule| {
            let matched = condition_holds(&rule.condition, request);
            tracing::debug!(
                rule_id = %rule.id,
                effect = ?rule.effect,
                matched,
                "rule evaluated"
            );
            RuleOutcome { rule, matched }
        })
        .collect()
}

/// Decide a single condition. Unknown counts as not holding.
pub fn condition_holds(condition: &Condition, request: &ActionRequest) -> bool {
    decide(condition, request) == Some(true)
}

/// `None` when the request lacks what the condition needs.
fn decide(condition: &Condition, request: &ActionRequest) -> Option<bool> {
    match condition {
        Condition::Always => Some(true),
        Condition::CategoryIn { categories } => Some(categories.contains(&request.category)),
        Condition::AmountAbove { threshold } => request.amount.map(|a| a > *threshold),
        Condition::AmountAtMost { threshold } => request.amount.map(|a| a <= *threshold),
        Condition::TargetIn { targets } => one_of(request.target.as_deref(), targets),
        Condition::TargetMatches { patterns } => request
            .target
            .as_deref()
            .map(|target| patterns.iter().any(|p| glob_matches(p, target))),
        Condition::DelegateIn { delegates } => one_of(request.delegate.as_deref(), delegates),
        Condition::DelegateTierIn { tiers } => one_of(request.delegate_tier.as_deref(), tiers),
        Condition::Attribute { field, op, value } => {
            compare(&request.attribute(field)?, *op, value)
        }
        Condition::All { conditions } => {
            let mut unknown = false;
            for condition in conditions {
                match decide(condition, request) {
                    Some(false) => return Some(false),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            (!unknown).then_some(true)
        }
        Condition::Any { conditions } => {
            let mut unknown = false;
            for condition in conditions {
                match decide(condition, request) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            (!unknown).then_some(false)
        }
        Condition::Not { condition } => decide(condition, request).map(|holds| !holds),
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

fn one_of(actual: Option<&str>, allowed: &[String]) -> Option<bool> {
    actual.map(|actual| allowed.iter().any(|candidate| same_text(actual, candidate)))
}

fn glob_matches(pattern: &str, text: &str) -> bool {
    // Patterns are validated at load; a pattern that still fails to compile
    // simply never matches.
    Pattern::new(pattern).is_ok_and(|p| p.matches_with(text, GLOB_OPTIONS))
}

fn compare(attribute: &Attribute<'_>, op: CompareOp, value: &Value) -> Option<bool> {
    match op {
        CompareOp::Eq => scalar_equals(attribute, value),
        CompareOp::Ne => scalar_equals(attribute, value).map(|equal| !equal),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let (Attribute::Number(actual), Some(expected)) = (attribute, numeric(value)) else {
                return None;
            };
            Some(match op {
                CompareOp::Gt => *actual > expected,
                CompareOp::Ge => *actual >= expected,
                CompareOp::Lt => *actual < expected,
                _ => *actual <= expected,
            })
        }
        CompareOp::In => member_of(attribute, value),
        CompareOp::NotIn => member_of(attribute, value).map(|member| !member),
    }
}

/// Membership over a list. Items of another type cannot rule membership out.
fn member_of(attribute: &Attribute<'_>, value: &Value) -> Option<bool> {
    let mut unknown = false;
    for item in value.as_array()? {
        match scalar_equals(attribute, item) {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    (!unknown).then_some(false)
}

/// `Some(equal)` when the two values are comparable, `None` on a type mismatch.
fn scalar_equals(attribute: &Attribute<'_>, value: &Value) -> Option<bool> {
    match (attribute, value) {
        (Attribute::Text(actual), Value::String(expected)) => Some(same_text(actual, expected)),
        (Attribute::Number(actual), Value::Number(_) | Value::String(_)) => {
            numeric(value).map(|expected| *actual == expected)
        }
        (Attribute::Flag(actual), Value::Bool(expected)) => Some(actual == expected),
        (Attribute::Text(actual), Value::Number(_)) => {
            // Numeric-looking context strings ("4") compare as numbers.
            let actual = parse_decimal(actual)?;
            numeric(value).map(|expected| actual == expected)
        }
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => decimal_from_number(n),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}
