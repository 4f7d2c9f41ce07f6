//! Top-level provisioning orchestrator
//!
//! Builds the fixed stage sequence — provision, readiness, client install,
//! bootstrap, publish, create, install, assert — wires each stage to the
//! lifecycle controller, runs the whole thing through [`StagedPipeline`], and
//! converts the outcome into a run report with a pass/fail verdict.
//!
//! Configuration problems (missing package URL variables, invalid profile)
//! are resolved before the first stage exists, so they escape as errors
//! rather than outcomes and never leave anything to compensate.

use crate::command::{CommandRunner, CommandSpec, Remote, RemoteTarget, SshRemote};
use crate::config::HarnessConfig;
use crate::errors::{Result, SmokestackError};
use crate::lifecycle::{DeploymentLifecycleController, DeploymentRecord};
use crate::pipeline::{
    with_scoped, DnsOverride, PipelineContext, PipelineOutcome, Stage, StagedPipeline,
};
use crate::profile::{ProfileImpl, TargetProfile};
use crate::readiness::{ReadinessPoller, DEFAULT_PROBE};
use crate::redaction;
use crate::registry::{ArtifactRegistry, ResolvedArtifact};
use crate::rest::RestClient;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Provisions and releases the remote target for a run
#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// Create (or claim) the machine for this run
    async fn provision(&self) -> Result<RemoteTarget>;

    /// Release the machine once the run is over
    async fn release(&self, target: &RemoteTarget) -> Result<()>;

    /// Address the management service will answer on for this target
    fn manager_address(&self, target: &RemoteTarget) -> String;
}

/// Provider for a pre-provisioned machine described in configuration
///
/// Provision hands out the configured target; release is a no-op because the
/// machine's lifetime is owned elsewhere.
pub struct StaticTargetProvider {
    target: RemoteTarget,
}

impl StaticTargetProvider {
    /// Wrap a configured target
    pub fn new(target: RemoteTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl TargetProvider for StaticTargetProvider {
    async fn provision(&self) -> Result<RemoteTarget> {
        info!(address = %self.target.address, "using pre-provisioned target");
        Ok(self.target.clone())
    }

    async fn release(&self, target: &RemoteTarget) -> Result<()> {
        info!(address = %target.address, "pre-provisioned target left running");
        Ok(())
    }

    fn manager_address(&self, target: &RemoteTarget) -> String {
        target.address.clone()
    }
}

/// Builds a transport for a provisioned target
pub type RemoteFactory = Arc<dyn Fn(RemoteTarget) -> Arc<dyn Remote> + Send + Sync>;

/// A compensation failure, flattened for the report
#[derive(Debug, Clone, Serialize)]
pub struct CompensationReport {
    /// Stage whose compensation failed
    pub stage: String,
    /// What went wrong; this cleanup needs manual attention
    pub error: String,
}

/// Aggregated result of one orchestrated run
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Correlation id of the run
    pub run_id: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run in seconds
    pub duration_secs: u64,
    /// Overall verdict
    pub passed: bool,
    /// Stage whose forward action failed, if any
    pub failed_stage: Option<String>,
    /// Root cause of the failure, if any
    pub error: Option<String>,
    /// Compensations that failed during unwind
    pub compensation_errors: Vec<CompensationReport>,
    /// Deployment state as of the verdict
    pub deployment: Option<DeploymentRecord>,
    /// Failures during post-success teardown
    pub cleanup_errors: Vec<String>,
}

/// Generate a unique run id from the configured prefix
fn generate_run_id(prefix: &str) -> String {
    format!("{}-{:08x}", prefix, fastrand::u32(..))
}

/// Generate the blueprint id for a run
fn generate_blueprint_id() -> String {
    format!("blueprint-{:08x}", fastrand::u32(..))
}

/// Generate the deployment id for a run
fn generate_deployment_id() -> String {
    format!("deployment-{:08x}", fastrand::u32(..))
}

/// Top-level driver composing readiness, commands, and the lifecycle
/// controller inside one staged pipeline
pub struct ProvisioningOrchestrator {
    config: Arc<HarnessConfig>,
    registry: ArtifactRegistry,
    provider: Arc<dyn TargetProvider>,
    remote_factory: RemoteFactory,
}

impl ProvisioningOrchestrator {
    /// Create an orchestrator with the ssh transport
    pub fn new(
        config: HarnessConfig,
        registry: ArtifactRegistry,
        provider: Arc<dyn TargetProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            provider,
            remote_factory: Arc::new(|target| Arc::new(SshRemote::new(target)) as Arc<dyn Remote>),
        }
    }

    /// Replace the transport factory (used by tests to inject doubles)
    pub fn with_remote_factory(mut self, factory: RemoteFactory) -> Self {
        self.remote_factory = factory;
        self
    }

    /// Run the full pipeline and produce a report
    ///
    /// Configuration errors are returned as errors before any stage runs;
    /// everything else is captured in the report.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<RunReport> {
        // Everything the stages need from configuration is resolved up
        // front; a missing package URL variable aborts before any resource
        // exists.
        self.config.validate()?;
        let profile = self.config.profile_kind()?.profile();
        let artifact = self.registry.resolve(&self.config.client_artifact_name()?)?;

        if let Some(password) = &self.config.admin_password {
            redaction::add_global_secret(password);
        }

        let run_id = generate_run_id(&self.config.run_prefix);
        info!(
            %run_id,
            profile = profile.name(),
            image = profile.image_name(),
            "starting provisioning run"
        );

        let started_at = Utc::now();
        let start = std::time::Instant::now();

        let mut ctx = PipelineContext::new(run_id.clone());
        let stages = self.build_stages(profile, artifact);
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        // Snapshot before post-success teardown so the report reflects the
        // state the verdict was decided on.
        let mut report = self.report_from_outcome(run_id, started_at, &ctx, outcome);

        if report.passed && self.config.teardown_on_success {
            report.cleanup_errors = self.teardown_after_success(&mut ctx).await;
        }
        report.duration_secs = start.elapsed().as_secs();

        Ok(report)
    }

    fn report_from_outcome(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        ctx: &PipelineContext,
        outcome: PipelineOutcome,
    ) -> RunReport {
        RunReport {
            run_id,
            started_at,
            duration_secs: 0,
            passed: outcome.success(),
            failed_stage: outcome.failed_stage,
            error: outcome.forward_error.as_ref().map(|e| e.to_string()),
            compensation_errors: outcome
                .compensation_errors
                .iter()
                .map(|f| CompensationReport {
                    stage: f.stage.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
            deployment: ctx.deployment.clone(),
            cleanup_errors: Vec::new(),
        }
    }

    fn manager_blueprint_path(&self, profile: ProfileImpl) -> String {
        self.config.manager_blueprint_path.clone().unwrap_or_else(|| {
            format!(
                "{}/cloudify-manager-blueprints/simple/simple-blueprint.yaml",
                profile.client_work_dir()
            )
        })
    }

    fn build_stages(&self, profile: ProfileImpl, artifact: ResolvedArtifact) -> Vec<Stage> {
        let blueprint_id = generate_blueprint_id();
        let deployment_id = generate_deployment_id();

        let mut stages = Vec::new();

        // provision: the only stage whose compensation releases the machine
        let provider = Arc::clone(&self.provider);
        let release_provider = Arc::clone(&self.provider);
        stages.push(
            Stage::new("provision", move |ctx| {
                Box::pin(async move {
                    let target = provider.provision().await?;
                    ctx.target = Some(target);
                    Ok(())
                })
            })
            .with_compensation(move |ctx| {
                Box::pin(async move {
                    let Some(target) = ctx.target.clone() else {
                        return Ok(());
                    };
                    release_provider.release(&target).await
                })
            }),
        );

        // readiness: no compensation of its own; a readiness failure still
        // releases the target through the provision stage's compensation
        let this = self.clone_refs();
        stages.push(Stage::new("readiness", move |ctx| {
            Box::pin(async move {
                let runner = this.runner_for(ctx)?;
                let poller = ReadinessPoller::new(
                    RetryPolicy::new(
                        this.config.timing.readiness_retries,
                        this.config.timing.readiness_interval(),
                    ),
                    this.config.timing.readiness_timeout(),
                );
                poller.wait_until_ready(&runner, DEFAULT_PROBE).await
            })
        }));

        // install client tooling: no compensation, leftover tooling on a
        // released machine costs nothing
        let this = self.clone_refs();
        let install_command = profile.install_client_command(&artifact.source_url);
        stages.push(Stage::new("install-client", move |ctx| {
            Box::pin(async move {
                let runner = this.runner_for(ctx)?;
                let spec = CommandSpec::new(install_command)
                    .privileged()
                    .retry(RetryPolicy::new(2, this.config.timing.command_interval()))
                    .correlation("install-client");
                runner.execute(&spec).await?;
                Ok(())
            })
        }));

        // bootstrap the management service; compensation tears it down
        let this = self.clone_refs();
        let teardown_this = self.clone_refs();
        let blueprint_path = self.manager_blueprint_path(profile);
        let package_url = artifact.source_url.clone();
        stages.push(
            Stage::new("bootstrap", move |ctx| {
                Box::pin(async move {
                    let runner = this.runner_for(ctx)?;
                    let controller = this.controller_for(ctx, profile)?;

                    // Bootstrap needs to know where the client package came
                    // from, keyed per distribution.
                    let mut inputs = this.config.bootstrap_inputs.clone();
                    if let Value::Object(map) = &mut inputs {
                        map.insert(
                            profile.package_parameter_name().to_string(),
                            Value::String(package_url),
                        );
                    }
                    let inputs_path = controller.upload_inputs("bootstrap-inputs", &inputs).await?;

                    let target = ctx
                        .target
                        .as_ref()
                        .ok_or_else(|| SmokestackError::Internal("target not provisioned".to_string()))?;
                    let manager_address = this.provider.manager_address(target);

                    let bootstrap = || {
                        controller.bootstrap_service(
                            &blueprint_path,
                            &inputs_path,
                            this.config.install_plugins,
                            &manager_address,
                        )
                    };

                    let handle = match &this.config.dns_nameservers {
                        Some(servers) => {
                            let dns = if servers.is_empty() {
                                DnsOverride::default()
                            } else {
                                DnsOverride::new(servers.clone())
                            };
                            with_scoped(&dns, &runner, bootstrap).await?
                        }
                        None => bootstrap().await?,
                    };

                    ctx.manager_address = Some(handle.manager_address);
                    Ok(())
                })
            })
            .with_compensation(move |ctx| {
                Box::pin(async move {
                    let controller = teardown_this.controller_for(ctx, profile)?;
                    controller.teardown_service().await
                })
            }),
        );

        // publish: artifacts are not rolled back, so no compensation
        let this = self.clone_refs();
        stages.push(Stage::new("publish", move |ctx| {
            Box::pin(async move {
                let controller = this.controller_for(ctx, profile)?;
                let id = controller
                    .publish_artifact(
                        &this.config.blueprint.archive_url,
                        &this.config.blueprint.root_doc,
                        &blueprint_id,
                    )
                    .await?;
                ctx.blueprint_id = Some(id);
                Ok(())
            })
        }));

        // create: the uninstall obligation is registered here, before the
        // install stage ever runs
        let this = self.clone_refs();
        let uninstall_this = self.clone_refs();
        stages.push(
            Stage::new("create", move |ctx| {
                Box::pin(async move {
                    let controller = this.controller_for(ctx, profile)?;
                    let blueprint_id = ctx.blueprint_id.clone().ok_or_else(|| {
                        SmokestackError::Internal("no published blueprint".to_string())
                    })?;
                    let inputs_path = controller
                        .upload_inputs("deployment-inputs", &this.config.deployment_inputs)
                        .await?;
                    let record = controller
                        .create_deployment(&blueprint_id, &deployment_id, &inputs_path)
                        .await?;
                    ctx.deployment = Some(record);
                    Ok(())
                })
            })
            .with_compensation(move |ctx| {
                Box::pin(async move {
                    let controller = uninstall_this.controller_for(ctx, profile)?;
                    let Some(record) = ctx.deployment.as_mut() else {
                        return Ok(());
                    };
                    controller.uninstall_deployment(record).await
                })
            }),
        );

        // install
        let this = self.clone_refs();
        stages.push(Stage::new("install", move |ctx| {
            Box::pin(async move {
                let controller = this.controller_for(ctx, profile)?;
                let Some(record) = ctx.deployment.as_mut() else {
                    return Err(SmokestackError::Internal(
                        "no deployment to install".to_string(),
                    ));
                };
                controller.install_deployment(record).await
            })
        }));

        // assert the deployed application answers
        let this = self.clone_refs();
        stages.push(Stage::new("assert", move |ctx| {
            Box::pin(async move {
                let controller = this.controller_for(ctx, profile)?;
                let manager_address = ctx
                    .manager_address
                    .clone()
                    .ok_or_else(|| SmokestackError::Internal("no manager address".to_string()))?;
                let rest = RestClient::new(format!("http://{}", manager_address))?;
                let Some(record) = ctx.deployment.as_ref() else {
                    return Err(SmokestackError::Internal(
                        "no deployment to assert".to_string(),
                    ));
                };
                controller
                    .assert_working(record, &rest, &this.config.endpoint_output_key)
                    .await
            })
        }));

        stages
    }

    /// Uninstall, tear down, and release after a successful run
    ///
    /// Best-effort: failures are reported for manual attention, never raised.
    async fn teardown_after_success(&self, ctx: &mut PipelineContext) -> Vec<String> {
        let mut errors = Vec::new();
        info!(run_id = %ctx.run_id, "run passed, tearing down");

        let profile = match self.config.profile_kind() {
            Ok(kind) => kind.profile(),
            Err(e) => {
                errors.push(e.to_string());
                return errors;
            }
        };

        match self.clone_refs().controller_for(ctx, profile) {
            Ok(controller) => {
                if let Some(record) = ctx.deployment.as_mut() {
                    if let Err(e) = controller.uninstall_deployment(record).await {
                        warn!(error = %e, "post-run uninstall failed");
                        errors.push(format!("uninstall: {}", e));
                    }
                }
                if let Err(e) = controller.teardown_service().await {
                    warn!(error = %e, "post-run teardown failed");
                    errors.push(format!("teardown: {}", e));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        if let Some(target) = ctx.target.clone() {
            if let Err(e) = self.provider.release(&target).await {
                warn!(error = %e, "post-run release failed");
                errors.push(format!("release: {}", e));
            }
        }

        errors
    }

    /// Cheap handle for moving the orchestrator's shared parts into stage
    /// closures
    fn clone_refs(&self) -> OrchestratorRefs {
        OrchestratorRefs {
            config: Arc::clone(&self.config),
            provider: Arc::clone(&self.provider),
            remote_factory: Arc::clone(&self.remote_factory),
        }
    }
}

/// The orchestrator's shared parts, cloneable into 'static stage closures
struct OrchestratorRefs {
    config: Arc<HarnessConfig>,
    provider: Arc<dyn TargetProvider>,
    remote_factory: RemoteFactory,
}

impl OrchestratorRefs {
    fn runner_for(&self, ctx: &PipelineContext) -> Result<CommandRunner> {
        let target = ctx
            .target
            .clone()
            .ok_or_else(|| SmokestackError::Internal("target not provisioned".to_string()))?;
        Ok(CommandRunner::new((self.remote_factory)(target)))
    }

    fn controller_for(
        &self,
        ctx: &PipelineContext,
        profile: ProfileImpl,
    ) -> Result<DeploymentLifecycleController> {
        Ok(DeploymentLifecycleController::new(
            self.runner_for(ctx)?,
            profile.client_work_dir(),
            self.config.timing.clone(),
        ))
    }
}
