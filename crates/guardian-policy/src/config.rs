//! Engine configuration from `guardian.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aggregator::DefaultPosture;
use crate::error::ConfigError;

/// Top-level configuration.
///
/// ```toml
/// default_posture = "block"
/// policy_file = "policies.yaml"
/// audit_log = ".guardian/audit.jsonl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GuardianConfig {
    /// Verdict when no rule matches. Required; there is no implicit default.
    pub default_posture: DefaultPosture,

    /// YAML ruleset to load at startup
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,

    /// Hash-chained JSONL audit log
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

fn default_policy_file() -> PathBuf {
    PathBuf::from("policies.yaml")
}

fn default_audit_log() -> PathBuf {
    PathBuf::from(".guardian/audit.jsonl")
}

impl GuardianConfig {
    /// Parse configuration text. Paths are left as written.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a file. Relative paths are resolved against the directory
    /// holding the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.policy_file = resolve(base, &config.policy_file);
        config.audit_log = resolve(base, &config.audit_log);
        Ok(config)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
