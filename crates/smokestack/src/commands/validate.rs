//! Validate command: check a configuration file without touching any target

use anyhow::Result;
use smokestack_core::config::HarnessConfig;
use std::path::Path;
use tracing::info;

pub async fn execute(config_path: &Path) -> Result<()> {
    let config = HarnessConfig::load(config_path)?;
    let profile = config.profile_kind()?;

    println!("configuration ok");
    println!("  target:   {}@{}", config.target.user, config.target.address);
    println!("  profile:  {}", profile);
    println!("  blueprint: {}", config.blueprint.archive_url);

    info!(path = %config_path.display(), "configuration validated");
    Ok(())
}
