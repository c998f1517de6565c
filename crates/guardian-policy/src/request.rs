// request.rs — The canonical Action Request evaluated by the engine.
//
// An ActionRequest is built once per intercepted agent action by the
// normalizer and is never mutated afterwards. Rules read it through
// `attribute()`, which resolves both first-class fields and forward-compatible
// keys from the raw context.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the agent wants to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionVerb {
    Cancel,
    Modify,
    Delegate,
    ShareCredential,
    Spend,
    Access,
}

impl ActionVerb {
    pub const ALL: [ActionVerb; 6] = [
        ActionVerb::Cancel,
        ActionVerb::Modify,
        ActionVerb::Delegate,
        ActionVerb::ShareCredential,
        ActionVerb::Spend,
        ActionVerb::Access,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::Cancel => "CANCEL",
            ActionVerb::Modify => "MODIFY",
            ActionVerb::Delegate => "DELEGATE",
            ActionVerb::ShareCredential => "SHARE_CREDENTIAL",
            ActionVerb::Spend => "SPEND",
            ActionVerb::Access => "ACCESS",
        }
    }

    /// Parse a verb leniently: case-insensitive, with `-`, `_` and spaces
    /// treated alike ("share-credential" == "SHARE_CREDENTIAL").
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = canonical_token(raw);
        Self::ALL.into_iter().find(|v| v.as_str() == canonical)
    }

    /// Verbs that hand access or secrets to another party.
    pub fn is_delegation(&self) -> bool {
        matches!(self, ActionVerb::Delegate | ActionVerb::ShareCredential)
    }
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of the target subscription or account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Entertainment,
    Utility,
    Financial,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Entertainment,
        Category::Utility,
        Category::Financial,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Entertainment => "ENTERTAINMENT",
            Category::Utility => "UTILITY",
            Category::Financial => "FINANCIAL",
            Category::Other => "OTHER",
        }
    }

    /// Parse a category name, case-insensitively. Returns None for unknown
    /// names; the normalizer maps those to `Other`.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = canonical_token(raw);
        Self::ALL.into_iter().find(|c| c.as_str() == canonical)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn canonical_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// A proposed agent action, normalized for evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    /// Who issued the request (end user or delegated party).
    pub actor: String,
    pub verb: ActionVerb,
    /// Subscription or account name (e.g. "Comcast Internet").
    pub target: Option<String>,
    pub category: Category,
    /// Monthly cost. Never negative.
    pub amount: Option<Decimal>,
    /// Party receiving access, for DELEGATE / SHARE_CREDENTIAL.
    pub delegate: Option<String>,
    /// Trust tier of the delegate (e.g. "household").
    pub delegate_tier: Option<String>,
    /// Every payload attribute not consumed above, for forward-compatible rules.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

/// A resolved request attribute, as seen by rule conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute<'a> {
    Text(Cow<'a, str>),
    Number(Decimal),
    Flag(bool),
}

impl ActionRequest {
    /// Minimal request, mostly for tests and embedders that already hold
    /// typed data. Everything optional starts empty.
    pub fn new(actor: impl Into<String>, verb: ActionVerb) -> Self {
        Self {
            actor: actor.into(),
            verb,
            target: None,
            category: Category::Other,
            amount: None,
            delegate: None,
            delegate_tier: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_delegate(mut self, delegate: impl Into<String>) -> Self {
        self.delegate = Some(delegate.into());
        self
    }

    pub fn with_delegate_tier(mut self, tier: impl Into<String>) -> Self {
        self.delegate_tier = Some(tier.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Resolve an attribute by name.
    ///
    /// First-class names: `actor`, `verb`, `target`, `category`, `amount`,
    /// `delegate`, `delegate_tier` (alias `trust_tier`). Anything else is
    /// looked up in the raw context, either as `context.<path>` or as a bare
    /// key; dots walk into nested objects. Returns None when the attribute is
    /// absent or not a scalar.
    pub fn attribute(&self, field: &str) -> Option<Attribute<'_>> {
        match field {
            "actor" => Some(Attribute::Text(Cow::Borrowed(&self.actor))),
            "verb" => Some(Attribute::Text(Cow::Borrowed(self.verb.as_str()))),
            "category" => Some(Attribute::Text(Cow::Borrowed(self.category.as_str()))),
            "target" => self.target.as_deref().map(|t| Attribute::Text(Cow::Borrowed(t))),
            "amount" => self.amount.map(Attribute::Number),
            "delegate" => self.delegate.as_deref().map(|d| Attribute::Text(Cow::Borrowed(d))),
            "delegate_tier" | "trust_tier" => self
                .delegate_tier
                .as_deref()
                .map(|t| Attribute::Text(Cow::Borrowed(t))),
            other => {
                let path = other.strip_prefix("context.").unwrap_or(other);
                self.context_value(path).and_then(scalar_attribute)
            }
        }
    }

    /// Resolve a raw-context path: the exact key, or a dotted walk into
    /// nested objects.
    pub(crate) fn context_value(&self, path: &str) -> Option<&serde_json::Value> {
        // Exact key first, so keys that themselves contain dots still resolve.
        if let Some(value) = self.context.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.context.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

fn scalar_attribute(value: &serde_json::Value) -> Option<Attribute<'_>> {
    match value {
        serde_json::Value::String(s) => Some(Attribute::Text(Cow::Borrowed(s))),
        serde_json::Value::Number(n) => decimal_from_number(n).map(Attribute::Number),
        serde_json::Value::Bool(b) => Some(Attribute::Flag(*b)),
        _ => None,
    }
}

/// Convert a JSON number to a Decimal without going through f64 rounding.
pub(crate) fn decimal_from_number(n: &serde_json::Number) -> Option<Decimal> {
    parse_decimal(&n.to_string())
}

/// Parse plain or scientific decimal notation ("15.99", "1e3").
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}
