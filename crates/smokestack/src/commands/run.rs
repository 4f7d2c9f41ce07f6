//! Run command: drive the full provisioning pipeline and report the verdict

use anyhow::{Context, Result};
use smokestack_core::config::HarnessConfig;
use smokestack_core::orchestrator::{ProvisioningOrchestrator, StaticTargetProvider};
use smokestack_core::profile::ProfileKind;
use smokestack_core::registry::ArtifactRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Raised when the run completed but the verdict is a failure
#[derive(Debug, thiserror::Error)]
#[error("run failed at stage '{stage}'")]
pub struct RunFailed {
    pub stage: String,
}

/// Arguments for the run command
pub struct RunArgs {
    pub config: PathBuf,
    pub registry: Option<PathBuf>,
    pub profile: Option<ProfileKind>,
    pub keep: bool,
    pub report: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = HarnessConfig::load(&args.config)?;

    if let Some(profile) = args.profile {
        config.profile = Some(profile.to_string());
    }
    if args.keep {
        config.teardown_on_success = false;
    }

    let registry = match &args.registry {
        Some(path) => ArtifactRegistry::from_path(path)?,
        None => ArtifactRegistry::builtin(),
    };

    let provider = Arc::new(StaticTargetProvider::new(config.target.clone()));
    let orchestrator = ProvisioningOrchestrator::new(config, registry, provider);

    let report = orchestrator.run().await?;

    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    if let Some(path) = &args.report {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    for cleanup in &report.cleanup_errors {
        tracing::warn!(error = %cleanup, "cleanup needs manual attention");
    }

    if report.passed {
        info!(run_id = %report.run_id, "run passed");
        Ok(())
    } else {
        let stage = report.failed_stage.unwrap_or_else(|| "unknown".to_string());
        Err(RunFailed { stage }.into())
    }
}
