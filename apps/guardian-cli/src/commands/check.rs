// check.rs — Validate the configured ruleset without evaluating anything.

use std::path::Path;
use std::process::ExitCode;

use guardian_policy::{PolicyError, PolicyStore};

pub fn execute(config_path: &Path) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let store = PolicyStore::new();

    let snapshot = match store.load_file(&config.policy_file) {
        Ok(snapshot) => snapshot,
        Err(PolicyError::InvalidPolicy { rule_ids, problems }) => {
            println!(
                "Ruleset {} rejected: {} invalid rule(s).",
                config.policy_file.display(),
                rule_ids.len()
            );
            for problem in &problems {
                println!("  - {}", problem);
            }
            anyhow::bail!("ruleset validation failed");
        }
        Err(e) => return Err(e.into()),
    };

    if snapshot.is_empty() {
        println!(
            "Ruleset {} is valid but empty; every request gets the default posture ({:?}).",
            config.policy_file.display(),
            config.default_posture
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<9} {:<6} {:<32} {:<28} {:<24} EXPIRES",
        "PRIORITY", "EFFECT", "ID", "VERBS", "CATEGORIES"
    );
    println!("{}", "-".repeat(110));

    for rule in snapshot.rules() {
        println!(
            "{:<9} {:<6} {:<32} {:<28} {:<24} {}",
            rule.priority,
            format!("{:?}", rule.effect).to_uppercase(),
            rule.id,
            list_or_any(rule.applies_to.verbs.iter().map(|v| v.as_str())),
            list_or_any(rule.applies_to.categories.iter().map(|c| c.as_str())),
            rule.expires_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    println!();
    println!(
        "{} rule(s) valid. Fingerprint {}. Default posture: {:?}.",
        snapshot.len(),
        snapshot.fingerprint(),
        config.default_posture
    );
    Ok(ExitCode::SUCCESS)
}

fn list_or_any<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined: Vec<&str> = items.collect();
    if joined.is_empty() {
        "*".to_string()
    } else {
        joined.join(",")
    }
}
