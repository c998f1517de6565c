// normalizer.rs — Turns an orchestrator payload into an ActionRequest.
//
// The orchestration layer hands us loosely typed JSON. Normalization is
// strict only where ambiguity could be exploited:
//
// - missing/unknown verb        → MalformedRequest
// - missing/blank actor         → MalformedRequest
// - negative/non-numeric amount → MalformedRequest
// - amount beyond Decimal range  → MalformedRequest ("out of range")
// - unknown/missing category    → Other (never an error; rules stay conservative)
//
// Keys the normalizer does not recognize are preserved in the raw context so
// newer rules can reference them. No side effects.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::PolicyError;
use crate::request::{decimal_from_number, parse_decimal, ActionRequest, ActionVerb, Category};

const ACTOR_KEYS: &[&str] = &["actor", "actor_id"];
const VERB_KEYS: &[&str] = &["verb", "action"];
const TARGET_KEYS: &[&str] = &["target", "target_entity"];
const CATEGORY_KEYS: &[&str] = &["category"];
const AMOUNT_KEYS: &[&str] = &["amount"];
const DELEGATE_KEYS: &[&str] = &["delegate", "delegate_id"];
const TIER_KEYS: &[&str] = &["delegate_tier", "trust_tier"];
const CONTEXT_KEY: &str = "context";

/// Normalize a structured payload into an ActionRequest.
pub fn normalize(payload: &Value) -> Result<ActionRequest, PolicyError> {
    let fields = payload
        .as_object()
        .ok_or_else(|| PolicyError::malformed("request payload must be a JSON object"))?;

    let actor = match first(fields, ACTOR_KEYS) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(PolicyError::malformed("actor identifier is missing"))
        }
        Some(_) => return Err(PolicyError::malformed("actor identifier must be a string")),
    };

    let verb = match first(fields, VERB_KEYS) {
        Some(Value::String(s)) => ActionVerb::parse(s)
            .ok_or_else(|| PolicyError::malformed(format!("unrecognized action verb '{}'", s)))?,
        Some(Value::Null) | None => return Err(PolicyError::malformed("action verb is missing")),
        Some(_) => return Err(PolicyError::malformed("action verb must be a string")),
    };

    let category = match first(fields, CATEGORY_KEYS) {
        Some(Value::String(s)) => Category::parse(s).unwrap_or_else(|| {
            tracing::debug!(category = %s, "unknown category, treating as OTHER");
            Category::Other
        }),
        _ => Category::Other,
    };

    let amount = match first(fields, AMOUNT_KEYS) {
        None | Some(Value::Null) => None,
        Some(raw) => Some(parse_amount(raw)?),
    };

    let request = ActionRequest {
        actor,
        verb,
        target: optional_text(fields, TARGET_KEYS, "target")?,
        category,
        amount,
        delegate: optional_text(fields, DELEGATE_KEYS, "delegate")?,
        delegate_tier: optional_text(fields, TIER_KEYS, "delegate trust tier")?,
        context: collect_context(fields),
    };

    validate(&request)?;
    Ok(request)
}

/// Check the invariants every evaluated request must satisfy, however it was
/// built: a non-blank actor and a non-negative amount.
pub fn validate(request: &ActionRequest) -> Result<(), PolicyError> {
    if request.actor.trim().is_empty() {
        return Err(PolicyError::malformed("actor identifier is missing"));
    }
    if let Some(amount) = request.amount {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PolicyError::malformed(format!(
                "amount must not be negative (got {})",
                amount
            )));
        }
    }
    Ok(())
}

fn first<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

fn parse_amount(raw: &Value) -> Result<Decimal, PolicyError> {
    let (parsed, numeric) = match raw {
        Value::Number(n) => (decimal_from_number(n), true),
        Value::String(s) => (parse_decimal(s), looks_numeric(s.trim())),
        _ => (None, false),
    };
    match parsed {
        Some(amount) => Ok(amount),
        None if numeric => Err(PolicyError::malformed(format!("amount '{}' is out of range", raw))),
        None => Err(PolicyError::malformed(format!("amount '{}' is not a number", raw))),
    }
}

/// A decimal literal, possibly with an exponent. Excludes "inf" and "NaN".
fn looks_numeric(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
        && text.parse::<f64>().is_ok()
}

/// Read an optional string field. Blank strings count as absent; any other
/// non-string value is rejected rather than guessed at.
fn optional_text(
    fields: &Map<String, Value>,
    keys: &[&str],
    label: &str,
) -> Result<Option<String>, PolicyError> {
    match first(fields, keys) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(PolicyError::malformed(format!("{} must be a string", label))),
    }
}

fn collect_context(fields: &Map<String, Value>) -> BTreeMap<String, Value> {
    let consumed: Vec<&str> = [
        ACTOR_KEYS,
        VERB_KEYS,
        TARGET_KEYS,
        CATEGORY_KEYS,
        AMOUNT_KEYS,
        DELEGATE_KEYS,
        TIER_KEYS,
    ]
    .concat();

    let mut context = BTreeMap::new();
    if let Some(Value::Object(nested)) = fields.get(CONTEXT_KEY) {
        for (key, value) in nested {
            context.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in fields {
        if key != CONTEXT_KEY && !consumed.contains(&key.as_str()) {
            context.insert(key.clone(), value.clone());
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn malformed_reason(payload: Value) -> String {
        match normalize(&payload) {
            Err(PolicyError::MalformedRequest { reason }) => reason,
            other => panic!("expected MalformedRequest, got {:?}", other),
        }
    }

    #[test]
    fn full_payload_normalizes() {
        let request = normalize(&json!({
            "actor": "user-1",
            "verb": "cancel",
            "target": "Netflix Premium",
            "category": "entertainment",
            "amount": 15.99,
        }))
        .unwrap();

        assert_eq!(request.actor, "user-1");
        assert_eq!(request.verb, ActionVerb::Cancel);
        assert_eq!(request.target.as_deref(), Some("Netflix Premium"));
        assert_eq!(request.category, Category::Entertainment);
        assert_eq!(request.amount, Some(Decimal::new(1599, 2)));
        assert!(request.context.is_empty());
    }

    #[test]
    fn missing_verb_is_malformed() {
        assert!(malformed_reason(json!({"actor": "user-1"})).contains("verb is missing"));
    }

    #[test]
    fn unrecognized_verb_is_malformed() {
        assert!(malformed_reason(json!({"actor": "u", "verb": "teleport"})).contains("teleport"));
    }

    #[test]
    fn missing_or_blank_actor_is_malformed() {
        assert!(malformed_reason(json!({"verb": "CANCEL"})).contains("actor"));
        assert!(malformed_reason(json!({"verb": "CANCEL", "actor": "  "})).contains("actor"));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(malformed_reason(json!(["CANCEL"])).contains("JSON object"));
    }

    #[test]
    fn unknown_or_missing_category_defaults_to_other() {
        let unknown = normalize(&json!({"actor": "u", "verb": "CANCEL", "category": "streaming"}))
            .unwrap();
        assert_eq!(unknown.category, Category::Other);

        let missing = normalize(&json!({"actor": "u", "verb": "CANCEL"})).unwrap();
        assert_eq!(missing.category, Category::Other);
    }

    #[test]
    fn negative_amount_is_malformed() {
        assert!(malformed_reason(json!({"actor": "u", "verb": "CANCEL", "amount": -5}))
            .contains("negative"));
    }

    #[test]
    fn non_numeric_amount_is_malformed() {
        assert!(
            malformed_reason(json!({"actor": "u", "verb": "CANCEL", "amount": "lots"}))
                .contains("not a number")
        );
        assert!(
            malformed_reason(json!({"actor": "u", "verb": "CANCEL", "amount": true}))
                .contains("not a number")
        );
    }

    #[test]
    fn amounts_beyond_decimal_range_are_reported_as_such() {
        let huge = json!("79228162514264337593543950336");
        for amount in [json!("1e-100"), huge, json!(1e300)] {
            let reason =
                malformed_reason(json!({"actor": "u", "verb": "SPEND", "amount": amount}));
            assert!(reason.contains("out of range"), "{}", reason);
        }
        assert!(
            malformed_reason(json!({"actor": "u", "verb": "SPEND", "amount": "inf"}))
                .contains("not a number")
        );
    }

    #[test]
    fn directly_built_requests_are_checked() {
        let spend = || ActionRequest::new("u", ActionVerb::Spend);
        assert!(validate(&spend().with_amount(Decimal::ZERO)).is_ok());
        assert!(validate(&spend().with_amount(Decimal::new(-1, 2))).is_err());
        assert!(validate(&ActionRequest::new("", ActionVerb::Spend)).is_err());
    }

    #[test]
    fn numeric_string_and_null_amounts() {
        let text = normalize(&json!({"actor": "u", "verb": "SPEND", "amount": "2000"})).unwrap();
        assert_eq!(text.amount, Some(Decimal::from(2000)));

        let null = normalize(&json!({"actor": "u", "verb": "CANCEL", "amount": null})).unwrap();
        assert_eq!(null.amount, None);

        let zero = normalize(&json!({"actor": "u", "verb": "CANCEL", "amount": 0})).unwrap();
        assert_eq!(zero.amount, Some(Decimal::ZERO));
    }

    #[test]
    fn delegation_fields_and_aliases() {
        let request = normalize(&json!({
            "actor": "user-1",
            "action": "DELEGATE",
            "target": "Spotify",
            "delegate": "Bob",
            "trust_tier": "household",
        }))
        .unwrap();
        assert_eq!(request.verb, ActionVerb::Delegate);
        assert_eq!(request.delegate.as_deref(), Some("Bob"));
        assert_eq!(request.delegate_tier.as_deref(), Some("household"));
    }

    #[test]
    fn blank_delegate_tier_counts_as_missing() {
        let request = normalize(&json!({
            "actor": "u", "verb": "DELEGATE", "delegate": "Bob", "delegate_tier": ""
        }))
        .unwrap();
        assert_eq!(request.delegate_tier, None);
    }

    #[test]
    fn non_string_delegate_is_malformed() {
        assert!(
            malformed_reason(json!({"actor": "u", "verb": "DELEGATE", "delegate": 42}))
                .contains("delegate must be a string")
        );
    }

    #[test]
    fn unknown_keys_and_nested_context_are_preserved() {
        let request = normalize(&json!({
            "actor": "u",
            "verb": "MODIFY",
            "plan": "family",
            "context": {"seats": 4, "plan": "solo"},
        }))
        .unwrap();

        // Top-level keys win over nested context keys.
        assert_eq!(request.context.get("plan"), Some(&json!("family")));
        assert_eq!(request.context.get("seats"), Some(&json!(4)));
        assert!(!request.context.contains_key("context"));
        assert!(!request.context.contains_key("actor"));
    }
}
