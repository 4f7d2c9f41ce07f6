//! Staged pipeline with compensating cleanup
//!
//! The pipeline runs an ordered sequence of named stages. Each stage has a
//! forward action and an optional compensating action. A compensation is
//! registered only after its stage's forward action has fully succeeded, so a
//! failing stage never contributes a compensation for itself, while every
//! prior successful stage is always unwound in reverse order. This is the
//! central correctness property of the harness: resources created across
//! provisioning, bootstrap, and deployment creation cannot leak, because the
//! cleanup obligation exists from the moment the resource does.
//!
//! Compensation failures are logged and collected in the outcome but never
//! re-raised and never stop the unwind.

use crate::command::{CommandRunner, CommandSpec, RemoteTarget};
use crate::errors::{Result, SmokestackError};
use crate::lifecycle::DeploymentRecord;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use tracing::{error, info, warn};

/// Boxed future returned by stage actions
pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

type BoxedAction = Box<dyn for<'a> FnOnce(&'a mut PipelineContext) -> StageFuture<'a> + Send>;

/// Mutable state accumulated across stages of one pipeline run
///
/// Exclusively owned by the pipeline for the duration of a run; never shared
/// across concurrent runs.
#[derive(Debug)]
pub struct PipelineContext {
    /// Correlation id for the whole run
    pub run_id: String,
    /// The provisioned machine, set by the provision stage
    pub target: Option<RemoteTarget>,
    /// Management service address, set once bootstrap completes
    pub manager_address: Option<String>,
    /// Identifier of the published blueprint archive
    pub blueprint_id: Option<String>,
    /// Deployment tracked through its lifecycle state machine
    pub deployment: Option<DeploymentRecord>,
}

impl PipelineContext {
    /// Create an empty context for a run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            target: None,
            manager_address: None,
            blueprint_id: None,
            deployment: None,
        }
    }
}

/// One unit of the pipeline: a named forward action plus an optional
/// compensating action
pub struct Stage {
    name: String,
    forward: BoxedAction,
    compensation: Option<BoxedAction>,
}

impl Stage {
    /// Create a stage with a forward action and no compensation
    pub fn new<F>(name: impl Into<String>, forward: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut PipelineContext) -> StageFuture<'a> + Send + 'static,
    {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            compensation: None,
        }
    }

    /// Attach a compensating action, run during unwind if this stage's
    /// forward action succeeded
    pub fn with_compensation<F>(mut self, compensation: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut PipelineContext) -> StageFuture<'a> + Send + 'static,
    {
        self.compensation = Some(Box::new(compensation));
        self
    }

    /// Stage name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("has_compensation", &self.compensation.is_some())
            .finish()
    }
}

/// A compensation that itself failed during unwind
#[derive(Debug)]
pub struct CompensationFailure {
    /// Name of the stage whose compensation failed
    pub stage: String,
    /// The error the compensation produced
    pub error: SmokestackError,
}

/// Structured result of one pipeline run
///
/// The caller always receives an outcome, never a bare error: forward
/// failures are captured here together with every compensation failure that
/// occurred during the unwind.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Name of the stage whose forward action failed, if any
    pub failed_stage: Option<String>,
    /// The forward error that stopped the pipeline, if any
    pub forward_error: Option<SmokestackError>,
    /// Compensations that failed during unwind, in execution order
    pub compensation_errors: Vec<CompensationFailure>,
}

impl PipelineOutcome {
    /// Whether every forward action succeeded
    pub fn success(&self) -> bool {
        self.forward_error.is_none()
    }
}

/// Runs stages in order and unwinds compensations on failure
pub struct StagedPipeline;

impl StagedPipeline {
    /// Run the stage sequence to completion
    ///
    /// Stages execute strictly sequentially. On the first forward failure,
    /// forward execution stops and every registered compensation runs in
    /// LIFO order; each compensation runs regardless of whether the previous
    /// one succeeded.
    pub async fn run(ctx: &mut PipelineContext, stages: Vec<Stage>) -> PipelineOutcome {
        let mut compensations: Vec<(String, BoxedAction)> = Vec::new();
        let mut failed_stage = None;
        let mut forward_error = None;

        for stage in stages {
            info!(run_id = %ctx.run_id, stage = %stage.name, "stage starting");
            match (stage.forward)(ctx).await {
                Ok(()) => {
                    info!(run_id = %ctx.run_id, stage = %stage.name, "stage succeeded");
                    if let Some(compensation) = stage.compensation {
                        compensations.push((stage.name, compensation));
                    }
                }
                Err(e) => {
                    error!(run_id = %ctx.run_id, stage = %stage.name, error = %e, "stage failed");
                    failed_stage = Some(stage.name);
                    forward_error = Some(e);
                    break;
                }
            }
        }

        let compensation_errors = if forward_error.is_some() {
            Self::unwind(ctx, compensations).await
        } else {
            Vec::new()
        };

        PipelineOutcome {
            failed_stage,
            forward_error,
            compensation_errors,
        }
    }

    async fn unwind(
        ctx: &mut PipelineContext,
        mut compensations: Vec<(String, BoxedAction)>,
    ) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();

        while let Some((stage, compensation)) = compensations.pop() {
            info!(run_id = %ctx.run_id, stage = %stage, "running compensation");
            if let Err(e) = compensation(ctx).await {
                // Never stop the unwind; record for the failure report
                warn!(run_id = %ctx.run_id, stage = %stage, error = %e, "compensation failed");
                failures.push(CompensationFailure { stage, error: e });
            }
        }

        failures
    }
}

/// A remote configuration change with a guaranteed revert
///
/// Apply, run an inner action, and always revert afterwards, whether the
/// inner action succeeded or not. Revert failures are logged but never mask
/// the inner result.
#[async_trait]
pub trait ScopedChange: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Apply the change to the target
    async fn apply(&self, runner: &CommandRunner) -> Result<()>;

    /// Undo the change on the target
    async fn revert(&self, runner: &CommandRunner) -> Result<()>;
}

/// Run `inner` with `change` applied, reverting afterwards in all cases
pub async fn with_scoped<T, F, Fut>(
    change: &dyn ScopedChange,
    runner: &CommandRunner,
    inner: F,
) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    change.apply(runner).await?;
    let result = inner().await;
    if let Err(e) = change.revert(runner).await {
        warn!(change = change.name(), error = %e, "failed to revert scoped change");
    }
    result
}

/// Nameserver entries appended to the target's resolver configuration for
/// the duration of a scoped block
///
/// Bootstrap inputs do not always carry nameservers, and a freshly
/// provisioned machine may ship with an empty resolv.conf; external package
/// downloads during bootstrap still need names to resolve.
#[derive(Debug, Clone)]
pub struct DnsOverride {
    nameservers: Vec<String>,
}

impl DnsOverride {
    /// Append the given nameservers to /etc/resolv.conf for the scope
    pub fn new(nameservers: Vec<String>) -> Self {
        Self { nameservers }
    }
}

impl Default for DnsOverride {
    fn default() -> Self {
        Self::new(vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()])
    }
}

#[async_trait]
impl ScopedChange for DnsOverride {
    fn name(&self) -> &str {
        "dns-override"
    }

    async fn apply(&self, runner: &CommandRunner) -> Result<()> {
        let spec = CommandSpec::new("chmod +w /etc/resolv.conf")
            .privileged()
            .correlation("dns-override");
        runner.execute(&spec).await?;
        for server in &self.nameservers {
            let spec =
                CommandSpec::new(format!("echo 'nameserver {}' >> /etc/resolv.conf", server))
                    .privileged()
                    .correlation("dns-override");
            runner.execute(&spec).await?;
        }
        Ok(())
    }

    async fn revert(&self, runner: &CommandRunner) -> Result<()> {
        for server in &self.nameservers {
            let spec =
                CommandSpec::new(format!("sed -i '/nameserver {}/d' /etc/resolv.conf", server))
                    .privileged()
                    .correlation("dns-override");
            runner.execute(&spec).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandResult, Remote};
    use crate::errors::LifecycleError;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    fn lifecycle_err(message: &str) -> SmokestackError {
        LifecycleError::Install {
            message: message.to_string(),
        }
        .into()
    }

    /// Stage that records its forward and compensation runs in a shared log
    fn recorded_stage(
        name: &str,
        log: &Arc<Mutex<Vec<String>>>,
        fail_forward: bool,
        fail_compensation: bool,
    ) -> Stage {
        let fwd_log = Arc::clone(log);
        let comp_log = Arc::clone(log);
        let fwd_name = name.to_string();
        let comp_name = name.to_string();

        Stage::new(name, move |_ctx| {
            Box::pin(async move {
                fwd_log.lock().unwrap().push(format!("forward:{}", fwd_name));
                if fail_forward {
                    Err(lifecycle_err(&fwd_name))
                } else {
                    Ok(())
                }
            })
        })
        .with_compensation(move |_ctx| {
            Box::pin(async move {
                comp_log
                    .lock()
                    .unwrap()
                    .push(format!("compensate:{}", comp_name));
                if fail_compensation {
                    Err(lifecycle_err(&comp_name))
                } else {
                    Ok(())
                }
            })
        })
    }

    #[tokio::test]
    async fn test_all_stages_succeed_no_compensations_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            recorded_stage("a", &log, false, false),
            recorded_stage("b", &log, false, false),
            recorded_stage("c", &log, false, false),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(outcome.success());
        assert!(outcome.failed_stage.is_none());
        assert!(outcome.compensation_errors.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["forward:a", "forward:b", "forward:c"]
        );
    }

    #[tokio::test]
    async fn test_failure_unwinds_prior_stages_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            recorded_stage("a", &log, false, false),
            recorded_stage("b", &log, false, false),
            recorded_stage("c", &log, true, false),
            recorded_stage("d", &log, false, false),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(!outcome.success());
        assert_eq!(outcome.failed_stage.as_deref(), Some("c"));
        assert!(outcome.forward_error.is_some());
        // Compensations run for exactly the stages before the failing one,
        // in strictly reverse order; the failing stage contributes none and
        // later stages never run at all.
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "forward:a",
                "forward:b",
                "forward:c",
                "compensate:b",
                "compensate:a"
            ]
        );
    }

    #[tokio::test]
    async fn test_first_stage_failure_runs_no_compensations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            recorded_stage("a", &log, true, false),
            recorded_stage("b", &log, false, false),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(!outcome.success());
        assert_eq!(outcome.failed_stage.as_deref(), Some("a"));
        assert_eq!(*log.lock().unwrap(), vec!["forward:a"]);
    }

    #[tokio::test]
    async fn test_failing_compensation_does_not_stop_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages = vec![
            recorded_stage("a", &log, false, false),
            recorded_stage("b", &log, false, true), // compensation fails
            recorded_stage("c", &log, true, false),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(!outcome.success());
        assert_eq!(outcome.compensation_errors.len(), 1);
        assert_eq!(outcome.compensation_errors[0].stage, "b");
        // a's compensation still ran after b's failed
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "forward:a",
                "forward:b",
                "forward:c",
                "compensate:b",
                "compensate:a"
            ]
        );
    }

    #[tokio::test]
    async fn test_stage_without_compensation_is_skipped_in_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let fwd_log = Arc::clone(&log);
        let bare = Stage::new("bare", move |_ctx| {
            Box::pin(async move {
                fwd_log.lock().unwrap().push("forward:bare".to_string());
                Ok(())
            })
        });

        let stages = vec![
            recorded_stage("a", &log, false, false),
            bare,
            recorded_stage("c", &log, true, false),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(!outcome.success());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["forward:a", "forward:bare", "forward:c", "compensate:a"]
        );
    }

    #[tokio::test]
    async fn test_context_threads_state_between_stages() {
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = Arc::clone(&observed);

        let stages = vec![
            Stage::new("set-address", |ctx| {
                Box::pin(async move {
                    ctx.manager_address = Some("10.0.0.9".to_string());
                    Ok(())
                })
            }),
            Stage::new("read-address", move |ctx| {
                let observed = Arc::clone(&observed_clone);
                Box::pin(async move {
                    *observed.lock().unwrap() = ctx.manager_address.clone();
                    Ok(())
                })
            }),
        ];

        let mut ctx = PipelineContext::new("run-1");
        let outcome = StagedPipeline::run(&mut ctx, stages).await;

        assert!(outcome.success());
        assert_eq!(observed.lock().unwrap().as_deref(), Some("10.0.0.9"));
    }

    /// Remote that records executed commands and always succeeds
    struct RecordingRemote {
        commands: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl Remote for RecordingRemote {
        async fn exec(&self, command: &str, privileged: bool) -> Result<CommandResult> {
            self.commands
                .lock()
                .unwrap()
                .push((command.to_string(), privileged));
            Ok(CommandResult::new(0, String::new(), String::new()))
        }

        async fn put_file(&self, _local: &Path, _remote_path: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_with_scoped_reverts_after_success() {
        let remote = Arc::new(RecordingRemote {
            commands: Mutex::new(Vec::new()),
        });
        let runner = CommandRunner::new(remote.clone());
        let change = DnsOverride::new(vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()]);

        let value = with_scoped(&change, &runner, || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);

        // chmod, one append per server, then one removal per server
        let commands = remote.commands.lock().unwrap();
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[0].0, "chmod +w /etc/resolv.conf");
        assert!(commands[1].0.contains("echo 'nameserver 8.8.8.8' >> /etc/resolv.conf"));
        assert!(commands[2].0.contains("echo 'nameserver 8.8.4.4' >> /etc/resolv.conf"));
        assert!(commands[3].0.contains("sed -i '/nameserver 8.8.8.8/d' /etc/resolv.conf"));
        assert!(commands[4].0.contains("sed -i '/nameserver 8.8.4.4/d' /etc/resolv.conf"));
        assert!(commands.iter().all(|(_, privileged)| *privileged));
    }

    #[tokio::test]
    async fn test_with_scoped_reverts_after_inner_failure() {
        let remote = Arc::new(RecordingRemote {
            commands: Mutex::new(Vec::new()),
        });
        let runner = CommandRunner::new(remote.clone());
        let change = DnsOverride::new(vec!["10.0.0.9".to_string()]);

        let result: Result<()> =
            with_scoped(&change, &runner, || async { Err(lifecycle_err("inner")) }).await;
        assert!(result.is_err());

        // Revert still ran
        let commands = remote.commands.lock().unwrap();
        assert_eq!(commands.len(), 3);
        assert!(commands[2].0.starts_with("sed -i"));
    }

    #[tokio::test]
    async fn test_with_scoped_revert_failure_does_not_mask_inner_result() {
        struct FailingRevert;

        #[async_trait]
        impl ScopedChange for FailingRevert {
            fn name(&self) -> &str {
                "failing-revert"
            }

            async fn apply(&self, _runner: &CommandRunner) -> Result<()> {
                Ok(())
            }

            async fn revert(&self, _runner: &CommandRunner) -> Result<()> {
                Err(lifecycle_err("revert broke"))
            }
        }

        let remote = Arc::new(RecordingRemote {
            commands: Mutex::new(Vec::new()),
        });
        let runner = CommandRunner::new(remote);

        let value = with_scoped(&FailingRevert, &runner, || async { Ok("inner-ok") })
            .await
            .unwrap();
        assert_eq!(value, "inner-ok");
    }
}
