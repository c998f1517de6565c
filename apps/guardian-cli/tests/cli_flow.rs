// cli_flow.rs — End-to-end test of the guardian binary.
//
// Flow:
//   1. Write guardian.toml and a ruleset into a temp project
//   2. guardian check       → ruleset accepted
//   3. guardian evaluate    → exit 0 for ALLOW, 2 for BLOCK, 1 for bad input
//   4. guardian audit list  → both verdicts recorded
//   5. guardian audit verify → hash chain intact

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

const POLICIES: &str = r#"
rules:
  - id: utility-cancel-blocked
    verbs: [CANCEL]
    categories: [UTILITY]
    effect: BLOCK
    priority: 100
    justification: "cannot cancel {target}; it is flagged as a critical utility."
  - id: cheap-entertainment
    verbs: [CANCEL]
    categories: [ENTERTAINMENT]
    condition: { kind: amount_at_most, threshold: 20 }
    effect: ALLOW
    priority: 10
    justification: "{target} costs {amount}/month, within the autonomous limit."
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("guardian.toml"),
        "default_posture = \"block\"\npolicy_file = \"policies.yaml\"\naudit_log = \"audit/decisions.jsonl\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("policies.yaml"), POLICIES).unwrap();
    dir
}

fn guardian(project: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_guardian"))
        .arg("--config")
        .arg(project.join("guardian.toml"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut input = child.stdin.take().unwrap();
        input.write_all(stdin.unwrap_or("").as_bytes()).unwrap();
    }
    child.wait_with_output().unwrap()
}

#[test]
fn check_evaluate_and_audit() {
    let project = project();

    // =========================================================
    // 1. Ruleset validates
    // =========================================================
    let check = guardian(project.path(), &["check"], None);
    assert!(check.status.success(), "{}", String::from_utf8_lossy(&check.stderr));
    let listing = String::from_utf8_lossy(&check.stdout);
    assert!(listing.contains("utility-cancel-blocked"));
    assert!(listing.contains("2 rule(s) valid"));

    // =========================================================
    // 2. ALLOW exits 0
    // =========================================================
    let allowed = guardian(
        project.path(),
        &["evaluate"],
        Some(r#"{"actor": "user-1", "verb": "CANCEL", "target": "Netflix Premium", "category": "ENTERTAINMENT", "amount": 15.99}"#),
    );
    assert_eq!(allowed.status.code(), Some(0));
    let verdict: serde_json::Value = serde_json::from_slice(&allowed.stdout).unwrap();
    assert_eq!(verdict["effect"], "ALLOW");

    // =========================================================
    // 3. BLOCK exits 2, from a request file
    // =========================================================
    let request_file = project.path().join("comcast.json");
    fs::write(
        &request_file,
        r#"{"actor": "user-1", "verb": "CANCEL", "target": "Comcast Internet", "category": "UTILITY", "amount": 79.99}"#,
    )
    .unwrap();
    let blocked = guardian(
        project.path(),
        &["evaluate", "--request", request_file.to_str().unwrap()],
        None,
    );
    assert_eq!(blocked.status.code(), Some(2));
    let verdict: serde_json::Value = serde_json::from_slice(&blocked.stdout).unwrap();
    assert_eq!(
        verdict["justification"],
        "cannot cancel Comcast Internet; it is flagged as a critical utility."
    );

    // =========================================================
    // 4. Malformed request exits 1 and is not recorded
    // =========================================================
    let malformed = guardian(
        project.path(),
        &["evaluate"],
        Some(r#"{"actor": "user-1", "target": "Hulu"}"#),
    );
    assert_eq!(malformed.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&malformed.stderr).contains("verb is missing"));

    // =========================================================
    // 5. Audit trail holds both verdicts, chain intact
    // =========================================================
    let list = guardian(project.path(), &["audit", "list"], None);
    assert!(list.status.success());
    let listing = String::from_utf8_lossy(&list.stdout);
    assert!(listing.contains("Netflix Premium"));
    assert!(listing.contains("Comcast Internet"));
    assert!(!listing.contains("Hulu"));

    let verify = guardian(project.path(), &["audit", "verify"], None);
    assert!(verify.status.success());
    assert!(String::from_utf8_lossy(&verify.stdout).contains("2 record(s), hash chain intact"));
}

#[test]
fn rejected_ruleset_fails_check() {
    let project = project();
    fs::write(
        project.path().join("policies.yaml"),
        "rules:\n  - id: typo\n    effect: PERMIT\n    justification: ok\n",
    )
    .unwrap();

    let check = guardian(project.path(), &["check"], None);
    assert_eq!(check.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&check.stdout).contains("typo: effect must be ALLOW or BLOCK"));
}

#[test]
fn missing_posture_is_a_config_error() {
    let project = project();
    fs::write(project.path().join("guardian.toml"), "policy_file = \"policies.yaml\"\n").unwrap();

    let check = guardian(project.path(), &["check"], None);
    assert_eq!(check.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&check.stderr).contains("default_posture"));
}

#[test]
fn unwritable_audit_log_still_yields_a_verdict() {
    let project = project();
    // A regular file where the log's parent directory should be.
    fs::write(project.path().join("blocker"), "not a directory").unwrap();
    fs::write(
        project.path().join("guardian.toml"),
        "default_posture = \"block\"\naudit_log = \"blocker/audit.jsonl\"\n",
    )
    .unwrap();

    let blocked = guardian(
        project.path(),
        &["evaluate"],
        Some(r#"{"actor": "user-1", "verb": "CANCEL", "target": "Comcast Internet", "category": "UTILITY"}"#),
    );
    assert_eq!(
        blocked.status.code(),
        Some(2),
        "{}",
        String::from_utf8_lossy(&blocked.stderr)
    );
    let verdict: serde_json::Value = serde_json::from_slice(&blocked.stdout).unwrap();
    assert_eq!(verdict["effect"], "BLOCK");
    assert_eq!(verdict["matched_rule_ids"][0], "utility-cancel-blocked");
    assert!(String::from_utf8_lossy(&blocked.stderr).contains("verdict was not recorded"));
}
