//! # guardian-policy
//!
//! Policy decision engine for autonomous subscription agents.
//!
//! Every action the agent proposes ("cancel Netflix", "delegate Spotify to
//! Bob") is normalized into an [`ActionRequest`], evaluated against the active
//! [`PolicySnapshot`], and answered with a binding [`Verdict`]: ALLOW or
//! BLOCK, plus a justification written for the end user.
//!
//! ## Key invariants
//!
//! - **Deny overrides**: any matched BLOCK rule wins over every ALLOW rule.
//! - **Delegation fails closed**: DELEGATE and SHARE_CREDENTIAL are blocked
//!   unless a matched ALLOW rule whitelists the delegate's trust tier.
//! - **Atomic reloads**: a ruleset with any invalid rule is rejected whole and
//!   the previous snapshot stays in force.
//! - **Audit never decides**: verdicts are recorded asynchronously; a failing
//!   audit sink raises an operational alert but never changes a verdict.
//!
//! ## Quick Example
//!
//! ```rust
//! use guardian_policy::{DefaultPosture, PolicyEngine, RuleSet};
//!
//! let engine = PolicyEngine::new(DefaultPosture::Block);
//! engine
//!     .load_policies(&RuleSet::from_yaml(r#"
//! rules:
//!   - id: utility-cancel-blocked
//!     verbs: [CANCEL]
//!     categories: [UTILITY]
//!     effect: BLOCK
//!     justification: "cannot cancel {target}; it is flagged as a critical utility."
//! "#).unwrap())
//!     .unwrap();
//!
//! let verdict = engine
//!     .evaluate(&serde_json::json!({
//!         "actor": "user-1",
//!         "verb": "CANCEL",
//!         "target": "Comcast Internet",
//!         "category": "UTILITY",
//!     }))
//!     .unwrap();
//! assert!(verdict.is_block());
//! ```

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod normalizer;
pub mod request;
pub mod rule;
pub mod store;
pub mod template;

pub use aggregator::{aggregate, DecisionBasis, DefaultPosture, Verdict};
pub use config::GuardianConfig;
pub use engine::{EvaluationTrace, PolicyEngine, RuleCheck};
pub use error::{ConfigError, PolicyError};
pub use evaluator::{condition_holds, evaluate_rules, RuleOutcome};
pub use normalizer::{normalize, validate};
pub use request::{ActionRequest, ActionVerb, Attribute, Category};
pub use rule::{
    Applicability, CompareOp, Condition, Effect, PolicyRule, RuleDefinition, RuleSet,
    MAX_CONDITION_DEPTH,
};
pub use store::{PolicySnapshot, PolicyStore};
pub use template::JustificationTemplate;
