pub mod audit;
pub mod check;
pub mod evaluate;

use std::path::Path;

use anyhow::Context;
use guardian_policy::GuardianConfig;

/// Load guardian.toml, naming the file in any error.
pub fn load_config(path: &Path) -> anyhow::Result<GuardianConfig> {
    GuardianConfig::load(path).with_context(|| format!("loading {}", path.display()))
}
