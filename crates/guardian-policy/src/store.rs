// store.rs — PolicyStore: the active ruleset as a swappable immutable snapshot.
//
// Evaluations grab an `Arc<PolicySnapshot>` and work on it without holding
// any lock, so a concurrent reload can never hand an evaluation half of the
// old ruleset and half of the new one. `load()` validates the complete
// candidate ruleset first and only then swaps the reference; a rejected
// ruleset leaves the previous snapshot in force.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use guardian_audit::hasher;

use crate::error::PolicyError;
use crate::request::{ActionVerb, Category};
use crate::rule::{PolicyRule, RuleSet};

/// An immutable, ordered view of one loaded ruleset.
#[derive(Debug)]
pub struct PolicySnapshot {
    version: u64,
    loaded_at: DateTime<Utc>,
    fingerprint: String,
    /// Sorted by descending priority, then ascending id.
    rules: Vec<PolicyRule>,
}

impl PolicySnapshot {
    /// The snapshot in force before any ruleset has been loaded.
    pub fn empty() -> Self {
        Self {
            version: 0,
            loaded_at: Utc::now(),
            fingerprint: hasher::hash_str(""),
            rules: Vec::new(),
        }
    }

    fn new(version: u64, fingerprint: String, mut rules: Vec<PolicyRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Self {
            version,
            loaded_at: Utc::now(),
            fingerprint,
            rules,
        }
    }

    /// Monotonic load counter; 0 is the initial empty snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// SHA-256 of the canonical JSON form of the loaded ruleset.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// All rules, highest priority first.
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules applicable to `verb` / `category` right now, in evaluation order.
    pub fn rules_for(&self, verb: ActionVerb, category: Category) -> Vec<&PolicyRule> {
        self.rules_for_at(verb, category, Utc::now())
    }

    /// Rules applicable to `verb` / `category` at `now`. Expired rules are skipped.
    pub fn rules_for_at(
        &self,
        verb: ActionVerb,
        category: Category,
        now: DateTime<Utc>,
    ) -> Vec<&PolicyRule> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to.matches(verb, category) && rule.is_active_at(now))
            .collect()
    }
}

/// Holds the active snapshot. Cheap to share behind an `Arc`.
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Create a store holding the empty snapshot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PolicySnapshot::empty())),
        }
    }

    /// The snapshot in force right now. Hold on to it for a whole evaluation.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        let guard = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    /// Validate `ruleset` and make it the active snapshot.
    ///
    /// All-or-nothing: on `InvalidPolicy` the previous snapshot stays active.
    pub fn load(&self, ruleset: &RuleSet) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let rules = validate_ruleset(ruleset)?;
        let fingerprint = hasher::hash_str(&serde_json::to_string(ruleset)?);

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let snapshot = Arc::new(PolicySnapshot::new(guard.version + 1, fingerprint, rules));
        *guard = Arc::clone(&snapshot);
        drop(guard);

        tracing::info!(
            version = snapshot.version(),
            rules = snapshot.len(),
            fingerprint = %snapshot.fingerprint(),
            "policy snapshot activated"
        );
        Ok(snapshot)
    }

    /// Parse a YAML ruleset and load it.
    pub fn load_yaml(&self, yaml: &str) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let ruleset = RuleSet::from_yaml(yaml)?;
        self.load(&ruleset)
    }

    /// Read a YAML ruleset file and load it.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Arc<PolicySnapshot>, PolicyError> {
        let path = path.as_ref();
        let yaml =
            std::fs::read_to_string(path).map_err(|source| PolicyError::PolicyFileUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        self.load_yaml(&yaml)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate every rule, collecting all offenders before deciding.
fn validate_ruleset(ruleset: &RuleSet) -> Result<Vec<PolicyRule>, PolicyError> {
    let mut id_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for def in &ruleset.rules {
        *id_counts.entry(def.id.trim()).or_default() += 1;
    }

    let mut rules = Vec::with_capacity(ruleset.rules.len());
    let mut rule_ids: Vec<String> = Vec::new();
    let mut problems: Vec<String> = Vec::new();

    for (index, def) in ruleset.rules.iter().enumerate() {
        let trimmed = def.id.trim();
        let label = if trimmed.is_empty() {
            format!("rule #{}", index + 1)
        } else {
            trimmed.to_string()
        };

        let mut rule_problems = match PolicyRule::from_definition(def) {
            Ok(rule) => {
                rules.push(rule);
                Vec::new()
            }
            Err(found) => found,
        };
        if !trimmed.is_empty() && id_counts.get(trimmed).copied().unwrap_or(0) > 1 {
            rule_problems.push("duplicate rule id".to_string());
        }

        if !rule_problems.is_empty() {
            if !rule_ids.contains(&label) {
                rule_ids.push(label.clone());
            }
            problems.extend(rule_problems.into_iter().map(|p| format!("{}: {}", label, p)));
        }
    }

    if rule_ids.is_empty() {
        Ok(rules)
    } else {
        tracing::warn!(
            offending = ?rule_ids,
            problems = problems.len(),
            "ruleset rejected; previous snapshot stays active"
        );
        Err(PolicyError::InvalidPolicy { rule_ids, problems })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDefinition;

    fn rule(id: &str, effect: &str, priority: i64) -> RuleDefinition {
        RuleDefinition {
            id: id.to_string(),
            effect: effect.to_string(),
            priority,
            justification: format!("{} applies to {{target}}", id),
            ..Default::default()
        }
    }

    fn ids(rules: &[&PolicyRule]) -> Vec<String> {
        rules.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn new_store_starts_empty_at_version_zero() {
        let store = PolicyStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn rules_are_ordered_by_priority_then_id() {
        let store = PolicyStore::new();
        store
            .load(&RuleSet::new(vec![
                rule("b-low", "ALLOW", 1),
                rule("z-high", "BLOCK", 10),
                rule("a-low", "ALLOW", 1),
                rule("m-mid", "ALLOW", 5),
            ]))
            .unwrap();

        let snapshot = store.snapshot();
        assert_eq!(
            ids(&snapshot.rules_for(ActionVerb::Cancel, Category::Other)),
            vec!["z-high", "m-mid", "a-low", "b-low"]
        );
    }

    #[test]
    fn rules_for_filters_by_applicability() {
        let mut utility = rule("utility", "BLOCK", 10);
        utility.verbs = vec!["CANCEL".to_string()];
        utility.categories = vec!["UTILITY".to_string()];

        let store = PolicyStore::new();
        store
            .load(&RuleSet::new(vec![utility, rule("catch-all", "ALLOW", 0)]))
            .unwrap();
        let snapshot = store.snapshot();

        assert_eq!(
            ids(&snapshot.rules_for(ActionVerb::Cancel, Category::Utility)),
            vec!["utility", "catch-all"]
        );
        assert_eq!(
            ids(&snapshot.rules_for(ActionVerb::Modify, Category::Utility)),
            vec!["catch-all"]
        );
    }

    #[test]
    fn expired_rules_are_not_applicable() {
        let mut expiring = rule("temporary", "ALLOW", 5);
        expiring.expires_at = Some("2026-01-31T00:00:00Z".to_string());

        let store = PolicyStore::new();
        store.load(&RuleSet::new(vec![expiring])).unwrap();
        let snapshot = store.snapshot();

        let january = DateTime::parse_from_rfc3339("2026-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let march = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            snapshot
                .rules_for_at(ActionVerb::Delegate, Category::Other, january)
                .len(),
            1
        );
        assert!(snapshot
            .rules_for_at(ActionVerb::Delegate, Category::Other, march)
            .is_empty());
    }

    #[test]
    fn invalid_rule_leaves_previous_snapshot_intact() {
        let store = PolicyStore::new();
        store
            .load(&RuleSet::new(vec![rule("good", "BLOCK", 1)]))
            .unwrap();
        let before = store.snapshot();

        let err = store
            .load(&RuleSet::new(vec![
                rule("fine", "ALLOW", 1),
                rule("broken", "PERMIT", 1),
            ]))
            .unwrap_err();

        match err {
            PolicyError::InvalidPolicy { rule_ids, problems } => {
                assert_eq!(rule_ids, vec!["broken".to_string()]);
                assert!(problems[0].starts_with("broken: "));
            }
            other => panic!("expected InvalidPolicy, got {:?}", other),
        }

        let after = store.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.rules()[0].id, "good");
    }

    #[test]
    fn every_offending_rule_is_named_once() {
        let store = PolicyStore::new();
        let mut bad_condition = rule("bad-condition", "BLOCK", 1);
        bad_condition.condition = Some(serde_json::json!({"kind": "telepathy"}));

        let err = store
            .load(&RuleSet::new(vec![
                rule("dup", "ALLOW", 1),
                rule("ok", "ALLOW", 1),
                rule("dup", "BLOCK", 2),
                bad_condition,
                rule("", "ALLOW", 0),
            ]))
            .unwrap_err();

        match err {
            PolicyError::InvalidPolicy { rule_ids, .. } => assert_eq!(
                rule_ids,
                vec![
                    "dup".to_string(),
                    "bad-condition".to_string(),
                    "rule #5".to_string()
                ]
            ),
            other => panic!("expected InvalidPolicy, got {:?}", other),
        }
        assert_eq!(store.snapshot().version(), 0);
    }

    #[test]
    fn successful_loads_bump_version_and_fingerprint() {
        let store = PolicyStore::new();
        let first = store
            .load(&RuleSet::new(vec![rule("a", "ALLOW", 1)]))
            .unwrap();
        let second = store
            .load(&RuleSet::new(vec![rule("b", "BLOCK", 1)]))
            .unwrap();

        assert_eq!(first.version(), 1);
        assert_eq!(second.version(), 2);
        assert_ne!(first.fingerprint(), second.fingerprint());
        // The first snapshot is still intact for anyone holding it.
        assert_eq!(first.rules()[0].id, "a");
    }

    #[test]
    fn unreadable_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("policies.yaml");
        match PolicyStore::new().load_file(&missing) {
            Err(PolicyError::PolicyFileUnreadable { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected PolicyFileUnreadable, got {:?}", other.map(|s| s.version())),
        }
    }

    #[test]
    fn load_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        std::fs::write(
            &path,
            "rules:\n  - id: all-cancels\n    verbs: [CANCEL]\n    effect: ALLOW\n    justification: ok\n",
        )
        .unwrap();

        let snapshot = PolicyStore::new().load_file(&path).unwrap();
        assert_eq!(snapshot.len(), 1);
    }
}
