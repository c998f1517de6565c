// template.rs — Justification templates.
//
// A rule's justification is the literal text shown to the end user, with
// `{placeholder}`s filled from the request. Templates are checked when a
// ruleset is loaded, so filling them during evaluation cannot fail.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::request::ActionRequest;

/// Placeholders a template may use, besides `{context.<key>}`.
pub const PLACEHOLDERS: &[&str] = &[
    "actor",
    "verb",
    "target",
    "category",
    "amount",
    "delegate",
    "delegate_tier",
];

/// Rendered in place of an attribute the request does not carry.
const MISSING_VALUE: &str = "unspecified";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder pattern is valid"))
}

/// A validated justification template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct JustificationTemplate(String);

impl JustificationTemplate {
    /// Check a raw template. Returns every problem found.
    pub fn parse(raw: &str) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();

        if raw.trim().is_empty() {
            problems.push("justification is empty".to_string());
        }

        for caps in placeholder_pattern().captures_iter(raw) {
            let name = &caps[1];
            if !is_known_placeholder(name) {
                problems.push(format!("unknown placeholder '{{{}}}'", name));
            }
        }

        let stripped = placeholder_pattern().replace_all(raw, "");
        if stripped.contains('{') || stripped.contains('}') {
            problems.push("unbalanced '{' or '}' in justification".to_string());
        }

        if problems.is_empty() {
            Ok(Self(raw.to_string()))
        } else {
            Err(problems)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fill every placeholder from the request.
    pub fn render(&self, request: &ActionRequest) -> String {
        placeholder_pattern()
            .replace_all(&self.0, |caps: &regex::Captures<'_>| {
                placeholder_value(&caps[1], request)
            })
            .into_owned()
    }
}

fn is_known_placeholder(name: &str) -> bool {
    PLACEHOLDERS.contains(&name)
        || name
            .strip_prefix("context.")
            .is_some_and(|key| !key.is_empty())
}

fn placeholder_value(name: &str, request: &ActionRequest) -> String {
    let value = match name {
        "actor" => Some(request.actor.clone()),
        "verb" => Some(request.verb.as_str().replace('_', " ").to_lowercase()),
        "target" => request.target.clone(),
        "category" => Some(request.category.as_str().to_lowercase()),
        "amount" => request.amount.map(|a| a.normalize().to_string()),
        "delegate" => request.delegate.clone(),
        "delegate_tier" => request.delegate_tier.clone(),
        other => other
            .strip_prefix("context.")
            .and_then(|path| request.context_value(path))
            .and_then(|v| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
    };
    value.unwrap_or_else(|| MISSING_VALUE.to_string())
}
