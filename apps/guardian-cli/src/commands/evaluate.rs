// evaluate.rs — Decide one action request and record it in the audit log.
//
// The verdict never depends on the audit log: if the log cannot be opened the
// request is still decided, and the lost record is alerted and reported.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use guardian_audit::{AuditDispatcher, AuditLog, UnavailableSink};
use guardian_policy::{normalize, PolicyEngine};

/// Exit status for a BLOCK verdict.
const BLOCKED: u8 = 2;

pub fn execute(config_path: &Path, request: &str, trace: bool) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let payload = read_payload(request)?;

    let audit = match AuditLog::open(&config.audit_log) {
        Ok(log) => AuditDispatcher::spawn(log)?,
        Err(e) => {
            tracing::warn!(error = %e, "audit log unavailable; verdicts will not be recorded");
            let label = config.audit_log.display().to_string();
            AuditDispatcher::spawn(UnavailableSink::new(label, &e))?
        }
    };
    let engine = PolicyEngine::new(config.default_posture).with_audit(audit);
    engine
        .load_policy_file(&config.policy_file)
        .with_context(|| format!("loading ruleset {}", config.policy_file.display()))?;

    let action = normalize(&payload).context("request rejected")?;
    let evaluation = engine
        .evaluate_with_trace(&action)
        .context("request rejected")?;

    let rendered = if trace {
        serde_json::to_string_pretty(&evaluation)?
    } else {
        serde_json::to_string_pretty(&evaluation.verdict)?
    };
    println!("{}", rendered);

    engine.flush_audit();
    if let Some(stats) = engine.audit_stats() {
        tracing::debug!(written = stats.written, failed = stats.failed, "audit flushed");
        if stats.failed > 0 {
            eprintln!(
                "warning: verdict was not recorded in {}",
                config.audit_log.display()
            );
        }
    }

    Ok(if evaluation.verdict.is_allow() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(BLOCKED)
    })
}

fn read_payload(source: &str) -> anyhow::Result<serde_json::Value> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading request {}", source))?
    };
    serde_json::from_str(&text).context("request is not valid JSON")
}
