//! Deployment lifecycle state machine and controller
//!
//! [`DeploymentRecord`] tracks a deployment through
//! CREATED -> INSTALLING -> INSTALLED -> UNINSTALLING -> UNINSTALLED, with
//! FAILED reachable from any non-terminal state. Transitions are checked at
//! the record level so illegal jumps are impossible no matter who drives it.
//!
//! [`DeploymentLifecycleController`] implements each lifecycle operation as
//! remote CLI invocations through [`CommandRunner`], plus the management API
//! calls the assertion needs.

use crate::command::{CommandRunner, CommandSpec};
use crate::config::TimingConfig;
use crate::errors::{LifecycleError, Result, SmokestackError};
use crate::rest::{self, RestClient};
use crate::retry::{default_classifier, retry_fixed, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Marker the bootstrap command must print for bootstrap to count as done
const BOOTSTRAP_MARKER: &str = "bootstrapping complete";

/// Lifecycle states of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Deployment exists but nothing is installed
    Created,
    /// Install workflow in flight
    Installing,
    /// Install workflow completed
    Installed,
    /// Uninstall workflow in flight
    Uninstalling,
    /// Uninstall completed; terminal
    Uninstalled,
    /// A lifecycle command failed
    Failed,
}

impl DeploymentState {
    /// Whether a transition to `next` is legal
    ///
    /// Cleanup is allowed out of FAILED so a broken install can still be
    /// uninstalled during unwind.
    pub fn can_transition(&self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Created, Installing)
                | (Created, Uninstalling)
                | (Installing, Installed)
                | (Installed, Uninstalling)
                | (Uninstalling, Uninstalled)
                | (Failed, Uninstalling)
                | (Created, Failed)
                | (Installing, Failed)
                | (Installed, Failed)
                | (Uninstalling, Failed)
        )
    }

    /// String representation matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Installing => "INSTALLING",
            Self::Installed => "INSTALLED",
            Self::Uninstalling => "UNINSTALLING",
            Self::Uninstalled => "UNINSTALLED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deployment tracked through its lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Deployment identifier
    pub deployment_id: String,
    /// Blueprint the deployment was created from
    pub blueprint_id: String,
    /// Current lifecycle state
    pub state: DeploymentState,
}

impl DeploymentRecord {
    /// Create a record in state CREATED
    pub fn new(deployment_id: impl Into<String>, blueprint_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            blueprint_id: blueprint_id.into(),
            state: DeploymentState::Created,
        }
    }

    /// Transition to `next`, failing on an illegal jump
    pub fn transition(&mut self, next: DeploymentState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        debug!(deployment_id = %self.deployment_id, from = %self.state, to = %next, "deployment state transition");
        self.state = next;
        Ok(())
    }

    /// Mark the record failed; legal from any non-terminal state
    pub fn fail(&mut self) {
        if self.state.can_transition(DeploymentState::Failed) {
            let _ = self.transition(DeploymentState::Failed);
        }
    }
}

/// Handle to a bootstrapped management service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHandle {
    /// Address the management API answers on
    pub manager_address: String,
}

/// Drives the management service through its lifecycle via the remote CLI
pub struct DeploymentLifecycleController {
    runner: CommandRunner,
    work_dir: String,
    cli: String,
    timing: TimingConfig,
}

impl DeploymentLifecycleController {
    /// Create a controller running the CLI out of `work_dir` on the target
    pub fn new(runner: CommandRunner, work_dir: impl Into<String>, timing: TimingConfig) -> Self {
        Self {
            runner,
            work_dir: work_dir.into(),
            cli: "cfy".to_string(),
            timing,
        }
    }

    /// Full CLI invocation: activate the client's virtualenv, then run
    fn cli_command(&self, args: &str) -> String {
        format!(
            "source {}/env/bin/activate && {} {}",
            self.work_dir, self.cli, args
        )
    }

    async fn run_cli(&self, args: &str, spec_tweak: impl FnOnce(CommandSpec) -> CommandSpec) -> Result<crate::command::CommandResult> {
        let spec = spec_tweak(CommandSpec::new(self.cli_command(args)));
        self.runner.execute(&spec).await
    }

    /// Upload a JSON document to the target's work dir, returning the remote path
    pub async fn upload_inputs(&self, name: &str, inputs: &Value) -> Result<String> {
        let local = std::env::temp_dir().join(format!("{}-{:08x}.json", name, fastrand::u32(..)));
        std::fs::write(&local, serde_json::to_vec_pretty(inputs).map_err(|e| {
            SmokestackError::Internal(format!("serializing {} inputs: {}", name, e))
        })?)
        .map_err(|e| SmokestackError::Internal(format!("writing {} inputs: {}", name, e)))?;

        let remote_path = format!("{}/{}.json", self.work_dir, name);
        let upload = self.runner.remote().put_file(&local, &remote_path).await;
        let _ = std::fs::remove_file(&local);
        upload?;
        Ok(remote_path)
    }

    /// Initialize the client environment and bootstrap the management service
    ///
    /// Fails with [`LifecycleError::Bootstrap`] if either command fails or
    /// the bootstrap output does not contain the completion marker.
    #[instrument(level = "info", skip_all, fields(blueprint = blueprint_path))]
    pub async fn bootstrap_service(
        &self,
        blueprint_path: &str,
        inputs_path: &str,
        install_plugins: bool,
        manager_address: &str,
    ) -> Result<ServiceHandle> {
        self.run_cli("init", |s| s.correlation("bootstrap"))
            .await
            .map_err(|e| bootstrap_error(format!("init failed: {}", e)))?;

        let mut args = format!("bootstrap -p {} -i {}", blueprint_path, inputs_path);
        if install_plugins {
            args.push_str(" --install-plugins");
        }

        let result = self
            .run_cli(&args, |s| s.correlation("bootstrap"))
            .await
            .map_err(|e| bootstrap_error(format!("bootstrap failed: {}", e)))?;

        if !result.stdout.contains(BOOTSTRAP_MARKER) {
            return Err(bootstrap_error(format!(
                "bootstrap output missing completion marker '{}'",
                BOOTSTRAP_MARKER
            )));
        }

        info!(manager_address, "management service bootstrapped");
        Ok(ServiceHandle {
            manager_address: manager_address.to_string(),
        })
    }

    /// Tear down the management service
    #[instrument(level = "info", skip_all)]
    pub async fn teardown_service(&self) -> Result<()> {
        self.run_cli("teardown -f --ignore-deployments", |s| {
            s.correlation("teardown")
        })
        .await
        .map_err(|e| {
            SmokestackError::from(LifecycleError::Teardown {
                message: e.to_string(),
            })
        })?;
        info!("management service torn down");
        Ok(())
    }

    /// Publish a blueprint archive, returning the blueprint id
    #[instrument(level = "info", skip_all, fields(blueprint_id = blueprint_id))]
    pub async fn publish_artifact(
        &self,
        archive_url: &str,
        root_doc: &str,
        blueprint_id: &str,
    ) -> Result<String> {
        let args = format!(
            "blueprints publish-archive -l {} -n {} -b {}",
            archive_url, root_doc, blueprint_id
        );
        self.run_cli(&args, |s| s.correlation("publish"))
            .await
            .map_err(|e| {
                SmokestackError::from(LifecycleError::Publish {
                    message: e.to_string(),
                })
            })?;
        Ok(blueprint_id.to_string())
    }

    /// Create a deployment from a published blueprint
    #[instrument(level = "info", skip_all, fields(deployment_id = deployment_id))]
    pub async fn create_deployment(
        &self,
        blueprint_id: &str,
        deployment_id: &str,
        inputs_path: &str,
    ) -> Result<DeploymentRecord> {
        let args = format!(
            "deployments create -b {} -d {} -i {}",
            blueprint_id, deployment_id, inputs_path
        );
        self.run_cli(&args, |s| s.correlation("create"))
            .await
            .map_err(|e| {
                SmokestackError::from(LifecycleError::Create {
                    message: e.to_string(),
                })
            })?;
        Ok(DeploymentRecord::new(deployment_id, blueprint_id))
    }

    /// Run the install workflow on a deployment
    ///
    /// A short settle delay is observed first since the deployment subsystem
    /// may not be consistent immediately after creation, and the execution is
    /// retried a small fixed number of times because install failures shortly
    /// after creation are frequently transient.
    #[instrument(level = "info", skip_all, fields(deployment_id = %record.deployment_id))]
    pub async fn install_deployment(&self, record: &mut DeploymentRecord) -> Result<()> {
        tokio::time::sleep(self.timing.settle_delay()).await;

        record.transition(DeploymentState::Installing)?;

        let args = format!("executions start -d {} -w install", record.deployment_id);
        let result = self
            .run_cli(&args, |s| {
                s.correlation("install").retry(RetryPolicy::new(
                    self.timing.install_retries,
                    self.timing.command_interval(),
                ))
            })
            .await;

        match result {
            Ok(_) => {
                record.transition(DeploymentState::Installed)?;
                Ok(())
            }
            Err(e) => {
                record.fail();
                Err(LifecycleError::Install {
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Assert the deployed application answers on its declared endpoint
    ///
    /// Fetches the deployment's outputs, resolves the named endpoint, and
    /// requires a 200 response; retried on a fixed interval because the
    /// validated service may still be starting.
    #[instrument(level = "info", skip_all, fields(deployment_id = %record.deployment_id))]
    pub async fn assert_working(
        &self,
        record: &DeploymentRecord,
        rest: &RestClient,
        endpoint_output_key: &str,
    ) -> Result<()> {
        let policy = RetryPolicy::new(self.timing.assert_retries, self.timing.assert_interval());

        retry_fixed(
            &policy,
            |attempt| async move {
                let outputs = rest.deployment_outputs(&record.deployment_id).await?;
                let url = endpoint_url(outputs.get(endpoint_output_key)?)?;
                let status = rest::fetch_status(&url).await?;
                if status == 200 {
                    debug!(attempt, %url, "assertion endpoint answered 200");
                    Ok(())
                } else {
                    Err(SmokestackError::from(LifecycleError::Assertion {
                        message: format!("endpoint {} returned status {}", url, status),
                    }))
                }
            },
            default_classifier,
        )
        .await
        .map_err(|e| match e {
            SmokestackError::Lifecycle(_) => e,
            other => LifecycleError::Assertion {
                message: other.to_string(),
            }
            .into(),
        })
    }

    /// Run the uninstall workflow on a deployment
    ///
    /// Idempotent: a record already in UNINSTALLED is a no-op, so running
    /// uninstall both as a forward step and again as a registered
    /// compensation never raises.
    #[instrument(level = "info", skip_all, fields(deployment_id = %record.deployment_id))]
    pub async fn uninstall_deployment(&self, record: &mut DeploymentRecord) -> Result<()> {
        if record.state == DeploymentState::Uninstalled {
            debug!("deployment already uninstalled, nothing to do");
            return Ok(());
        }

        record.transition(DeploymentState::Uninstalling)?;

        let args = format!("executions start -d {} -w uninstall", record.deployment_id);
        let result = self.run_cli(&args, |s| s.correlation("uninstall")).await;

        match result {
            Ok(_) => {
                record.transition(DeploymentState::Uninstalled)?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "uninstall execution failed");
                record.fail();
                Err(LifecycleError::Uninstall {
                    message: e.to_string(),
                }
                .into())
            }
        }
    }
}

fn bootstrap_error(message: String) -> SmokestackError {
    LifecycleError::Bootstrap { message }.into()
}

/// Resolve the endpoint output value into a URL
///
/// Accepts either a plain string URL or an object with a `url` field.
fn endpoint_url(value: &Value) -> Result<String> {
    match value {
        Value::String(url) => Ok(url.clone()),
        Value::Object(map) => match map.get("url").and_then(Value::as_str) {
            Some(url) => Ok(url.to_string()),
            None => Err(LifecycleError::Assertion {
                message: "endpoint output object has no 'url' field".to_string(),
            }
            .into()),
        },
        other => Err(LifecycleError::Assertion {
            message: format!("endpoint output has unsupported shape: {}", other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandResult, Remote};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            settle_delay_secs: 0,
            command_interval_secs: 0,
            assert_interval_secs: 0,
            ..TimingConfig::default()
        }
    }

    /// Remote that records commands and answers from a script keyed by substring
    struct CliRemote {
        commands: Mutex<Vec<String>>,
        responses: Mutex<Vec<(&'static str, CommandResult)>>,
    }

    impl CliRemote {
        fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                responses: Mutex::new(Vec::new()),
            }
        }

        fn respond(self, needle: &'static str, result: CommandResult) -> Self {
            self.responses.lock().unwrap().push((needle, result));
            self
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Remote for CliRemote {
        async fn exec(&self, command: &str, _privileged: bool) -> Result<CommandResult> {
            self.commands.lock().unwrap().push(command.to_string());
            let responses = self.responses.lock().unwrap();
            for (needle, result) in responses.iter() {
                if command.contains(needle) {
                    return Ok(result.clone());
                }
            }
            Ok(CommandResult::new(0, String::new(), String::new()))
        }

        async fn put_file(&self, _local: &Path, _remote_path: &str) -> Result<()> {
            Ok(())
        }
    }

    fn controller(remote: Arc<CliRemote>) -> DeploymentLifecycleController {
        DeploymentLifecycleController::new(
            CommandRunner::new(remote),
            "/home/centos",
            fast_timing(),
        )
    }

    #[test]
    fn test_state_legal_transitions() {
        use DeploymentState::*;
        assert!(Created.can_transition(Installing));
        assert!(Installing.can_transition(Installed));
        assert!(Installed.can_transition(Uninstalling));
        assert!(Uninstalling.can_transition(Uninstalled));
        assert!(Created.can_transition(Uninstalling));
        assert!(Failed.can_transition(Uninstalling));
    }

    #[test]
    fn test_state_illegal_transitions() {
        use DeploymentState::*;
        assert!(!Created.can_transition(Installed));
        assert!(!Installed.can_transition(Installing));
        assert!(!Uninstalled.can_transition(Installing));
        assert!(!Uninstalled.can_transition(Failed));
        assert!(!Uninstalled.can_transition(Uninstalling));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_states() {
        use DeploymentState::*;
        for state in [Created, Installing, Installed, Uninstalling] {
            assert!(state.can_transition(Failed), "{} -> FAILED", state);
        }
    }

    #[test]
    fn test_record_transition_enforced() {
        let mut record = DeploymentRecord::new("dep-1", "bp-1");
        assert_eq!(record.state, DeploymentState::Created);

        record.transition(DeploymentState::Installing).unwrap();
        let err = record.transition(DeploymentState::Created).unwrap_err();
        assert!(matches!(
            err,
            SmokestackError::Lifecycle(LifecycleError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_fail_is_noop_on_terminal_state() {
        let mut record = DeploymentRecord::new("dep-1", "bp-1");
        record.transition(DeploymentState::Uninstalling).unwrap();
        record.transition(DeploymentState::Uninstalled).unwrap();

        record.fail();
        assert_eq!(record.state, DeploymentState::Uninstalled);
    }

    #[test]
    fn test_state_serialization_matches_display() {
        let json = serde_json::to_string(&DeploymentState::Uninstalling).unwrap();
        assert_eq!(json, "\"UNINSTALLING\"");
        assert_eq!(DeploymentState::Uninstalling.to_string(), "UNINSTALLING");
    }

    #[test]
    fn test_cli_command_sources_virtualenv() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote);
        assert_eq!(
            controller.cli_command("status"),
            "source /home/centos/env/bin/activate && cfy status"
        );
    }

    #[tokio::test]
    async fn test_bootstrap_runs_init_then_bootstrap() {
        let remote = Arc::new(CliRemote::new().respond(
            "bootstrap -p",
            CommandResult::new(0, "... bootstrapping complete".to_string(), String::new()),
        ));
        let controller = controller(remote.clone());

        let handle = controller
            .bootstrap_service(
                "/home/centos/blueprint.yaml",
                "/home/centos/bootstrap-inputs.json",
                true,
                "10.0.0.5",
            )
            .await
            .unwrap();

        assert_eq!(handle.manager_address, "10.0.0.5");
        let commands = remote.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].ends_with("cfy init"));
        assert!(commands[1].contains("cfy bootstrap -p /home/centos/blueprint.yaml"));
        assert!(commands[1].contains("--install-plugins"));
    }

    #[tokio::test]
    async fn test_bootstrap_requires_completion_marker() {
        let remote = Arc::new(CliRemote::new().respond(
            "bootstrap -p",
            CommandResult::new(0, "done but no marker".to_string(), String::new()),
        ));
        let controller = controller(remote);

        let err = controller
            .bootstrap_service("bp.yaml", "inputs.json", false, "10.0.0.5")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SmokestackError::Lifecycle(LifecycleError::Bootstrap { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_maps_failure() {
        let remote = Arc::new(CliRemote::new().respond(
            "publish-archive",
            CommandResult::new(1, String::new(), "bad archive".to_string()),
        ));
        let controller = controller(remote);

        let err = controller
            .publish_artifact("http://example/bp.tar.gz", "bp.yaml", "bp-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SmokestackError::Lifecycle(LifecycleError::Publish { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_deployment_returns_created_record() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote.clone());

        let record = controller
            .create_deployment("bp-1", "dep-1", "/home/centos/deployment-inputs.json")
            .await
            .unwrap();

        assert_eq!(record.state, DeploymentState::Created);
        assert_eq!(record.deployment_id, "dep-1");
        assert!(remote.commands()[0].contains("deployments create -b bp-1 -d dep-1"));
    }

    #[tokio::test]
    async fn test_install_transitions_to_installed() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote.clone());
        let mut record = DeploymentRecord::new("dep-1", "bp-1");

        controller.install_deployment(&mut record).await.unwrap();
        assert_eq!(record.state, DeploymentState::Installed);
        assert!(remote.commands()[0].contains("executions start -d dep-1 -w install"));
    }

    #[tokio::test]
    async fn test_install_retries_then_fails_and_marks_record() {
        let remote = Arc::new(CliRemote::new().respond(
            "-w install",
            CommandResult::new(1, String::new(), "still converging".to_string()),
        ));
        let controller = controller(remote.clone());
        let mut record = DeploymentRecord::new("dep-1", "bp-1");

        let err = controller
            .install_deployment(&mut record)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SmokestackError::Lifecycle(LifecycleError::Install { .. })
        ));
        assert_eq!(record.state, DeploymentState::Failed);
        // install_retries(2) + initial attempt
        assert_eq!(remote.commands().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_observes_settle_delay() {
        let remote = Arc::new(CliRemote::new());
        let controller = DeploymentLifecycleController::new(
            CommandRunner::new(remote),
            "/home/centos",
            TimingConfig {
                settle_delay_secs: 15,
                ..fast_timing()
            },
        );
        let mut record = DeploymentRecord::new("dep-1", "bp-1");

        let start = tokio::time::Instant::now();
        controller.install_deployment(&mut record).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_uninstall_is_idempotent() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote.clone());
        let mut record = DeploymentRecord::new("dep-1", "bp-1");
        record.transition(DeploymentState::Installing).unwrap();
        record.transition(DeploymentState::Installed).unwrap();

        controller.uninstall_deployment(&mut record).await.unwrap();
        assert_eq!(record.state, DeploymentState::Uninstalled);
        assert_eq!(remote.commands().len(), 1);

        // Second call observes UNINSTALLED and is a no-op
        controller.uninstall_deployment(&mut record).await.unwrap();
        assert_eq!(remote.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_allowed_from_failed() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote);
        let mut record = DeploymentRecord::new("dep-1", "bp-1");
        record.fail();

        controller.uninstall_deployment(&mut record).await.unwrap();
        assert_eq!(record.state, DeploymentState::Uninstalled);
    }

    #[test]
    fn test_endpoint_url_shapes() {
        let url = endpoint_url(&serde_json::json!("http://10.0.0.9:8080")).unwrap();
        assert_eq!(url, "http://10.0.0.9:8080");

        let url = endpoint_url(&serde_json::json!({"url": "http://10.0.0.9:8080"})).unwrap();
        assert_eq!(url, "http://10.0.0.9:8080");

        assert!(endpoint_url(&serde_json::json!({"ip": "10.0.0.9"})).is_err());
        assert!(endpoint_url(&serde_json::json!(42)).is_err());
    }

    #[tokio::test]
    async fn test_assert_working_retries_until_endpoint_answers() {
        let app = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&app)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&app)
            .await;

        let manager = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/deployments/dep-1/outputs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "deployment_id": "dep-1",
                "outputs": {"endpoint": {"url": app.uri()}},
            })))
            .mount(&manager)
            .await;

        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote);
        let rest = RestClient::new(manager.uri()).unwrap();
        let record = DeploymentRecord::new("dep-1", "bp-1");

        controller
            .assert_working(&record, &rest, "endpoint")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assert_working_exhausted_is_assertion_error() {
        let app = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&app)
            .await;

        let manager = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/deployments/dep-1/outputs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "deployment_id": "dep-1",
                "outputs": {"endpoint": app.uri()},
            })))
            .mount(&manager)
            .await;

        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote);
        let rest = RestClient::new(manager.uri()).unwrap();
        let record = DeploymentRecord::new("dep-1", "bp-1");

        let err = controller
            .assert_working(&record, &rest, "endpoint")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SmokestackError::Lifecycle(LifecycleError::Assertion { .. })
        ));
    }

    #[tokio::test]
    async fn test_teardown_invokes_forced_teardown() {
        let remote = Arc::new(CliRemote::new());
        let controller = controller(remote.clone());

        controller.teardown_service().await.unwrap();
        assert!(remote.commands()[0].contains("teardown -f --ignore-deployments"));
    }
}
