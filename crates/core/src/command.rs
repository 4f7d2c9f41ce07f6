//! Remote command execution
//!
//! This module provides the execution engine every other component goes
//! through to touch a machine: a [`Remote`] transport trait with an ssh-backed
//! implementation, a [`CommandSpec`] describing one invocation (privilege,
//! sensitivity, retry policy, per-attempt timeout), and the [`CommandRunner`]
//! that drives attempts through the shared retry primitive.

use crate::errors::{RemoteError, Result, SmokestackError};
use crate::redaction;
use crate::retry::{retry_fixed, RetryDecision, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Exit code reported for an attempt cut off by its per-attempt timeout
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Placeholder logged in place of sensitive command text and output
const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

/// Identity and connection parameters of a provisioned machine
///
/// Created once per run by the target provider and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTarget {
    /// Address the transport connects to
    pub address: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login user
    pub user: String,
    /// Private key file, if key-based auth is used
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

impl RemoteTarget {
    /// The `user@address` destination string used by ssh and scp
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// Captured outcome of a single remote command attempt
///
/// Immutable once produced; success is derived from the exit code so the two
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Process exit code (or a synthetic code for timeouts)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandResult {
    /// Create a new CommandResult
    pub fn new(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
        }
    }

    /// Whether the command succeeded (exit code 0)
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Synthetic result for an attempt that hit its per-attempt timeout
    fn timed_out(timeout: Duration) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("command timed out after {:?}", timeout),
        }
    }
}

/// Specification for one remote command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command text, run through the login shell on the target
    pub command: String,
    /// Run under sudo
    pub privileged: bool,
    /// Suppress command text and output from all log sinks
    pub sensitive: bool,
    /// Return the failed result from the final attempt instead of raising
    pub warn_only: bool,
    /// Retry policy for failed attempts
    pub retry: RetryPolicy,
    /// Per-attempt timeout; an elapsed timeout consumes one attempt
    pub timeout: Option<Duration>,
    /// Correlation id of the invoking stage, carried into every log line
    pub correlation: Option<String>,
}

impl CommandSpec {
    /// Create a spec with defaults: unprivileged, loggable, single attempt
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            privileged: false,
            sensitive: false,
            warn_only: false,
            retry: RetryPolicy::none(),
            timeout: None,
            correlation: None,
        }
    }

    /// Run the command under sudo
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Suppress command text and output from logs
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Return the final failed result instead of raising
    pub fn warn_only(mut self) -> Self {
        self.warn_only = true;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Tag log lines with the invoking stage
    pub fn correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }

    /// Command text as it may appear in logs
    fn loggable_command(&self) -> String {
        if self.sensitive {
            SENSITIVE_PLACEHOLDER.to_string()
        } else {
            redaction::redact(&self.command)
        }
    }
}

/// Transport to a remote target
///
/// A single attempt with no retry semantics; retry, timeout, and logging live
/// in [`CommandRunner`] so every transport (including test doubles) shares
/// them.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Execute one command attempt and capture its outcome
    async fn exec(&self, command: &str, privileged: bool) -> Result<CommandResult>;

    /// Copy a local file onto the target
    async fn put_file(&self, local: &Path, remote_path: &str) -> Result<()>;
}

/// Remote transport backed by the system ssh and scp binaries
pub struct SshRemote {
    target: RemoteTarget,
    connect_timeout: Duration,
}

impl SshRemote {
    /// Create a transport for the given target
    pub fn new(target: RemoteTarget) -> Self {
        Self {
            target,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Common ssh options: fresh machines have unknown host keys
    fn base_args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
        ]
    }

    fn ssh_args(&self, command: &str, privileged: bool) -> Vec<String> {
        let mut args = self.base_args();
        args.push("-p".to_string());
        args.push(self.target.port.to_string());
        if let Some(keyfile) = &self.target.keyfile {
            args.push("-i".to_string());
            args.push(keyfile.display().to_string());
        }
        args.push(self.target.destination());
        if privileged {
            args.push(format!("sudo -n bash -c {}", shell_quote(command)));
        } else {
            args.push(command.to_string());
        }
        args
    }

    fn scp_args(&self, local: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push("-P".to_string());
        args.push(self.target.port.to_string());
        if let Some(keyfile) = &self.target.keyfile {
            args.push("-i".to_string());
            args.push(keyfile.display().to_string());
        }
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.target.destination(), remote_path));
        args
    }
}

/// Single-quote a string for embedding in a remote shell command
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
impl Remote for SshRemote {
    async fn exec(&self, command: &str, privileged: bool) -> Result<CommandResult> {
        let output = tokio::process::Command::new("ssh")
            .args(self.ssh_args(command, privileged))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SmokestackError::from(RemoteError::Spawn {
                    message: format!("ssh: {}", e),
                })
            })?;

        Ok(CommandResult::new(
            // Treat signal-terminated commands as failures with a sentinel code
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    async fn put_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let output = tokio::process::Command::new("scp")
            .args(self.scp_args(local, remote_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SmokestackError::from(RemoteError::Spawn {
                    message: format!("scp: {}", e),
                })
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RemoteError::Upload {
                path: local.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into())
        }
    }
}

/// Outcome of one attempt inside the retry loop
#[derive(Debug)]
enum AttemptError {
    /// Transport could not run the command at all; retrying cannot help
    Fatal(SmokestackError),
    /// Command ran and failed (or timed out); retryable
    Failed(CommandResult),
}

fn classify_attempt(error: &AttemptError) -> RetryDecision {
    match error {
        AttemptError::Fatal(_) => RetryDecision::Stop,
        AttemptError::Failed(_) => RetryDecision::Retry,
    }
}

/// Executes commands against one remote target with retry and logging
#[derive(Clone)]
pub struct CommandRunner {
    remote: Arc<dyn Remote>,
}

impl CommandRunner {
    /// Create a runner over the given transport
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self { remote }
    }

    /// Access the underlying transport (for file uploads)
    pub fn remote(&self) -> &Arc<dyn Remote> {
        &self.remote
    }

    /// Execute a command according to its spec
    ///
    /// Fails with [`RemoteError::ExecutionFailed`] carrying the last attempt's
    /// result once all attempts are exhausted. With `warn_only` set, retries
    /// are honored first and only the final failed attempt is returned as a
    /// failed result instead of an error.
    #[instrument(level = "debug", skip_all, fields(correlation = spec.correlation.as_deref().unwrap_or("-")))]
    pub async fn execute(&self, spec: &CommandSpec) -> Result<CommandResult> {
        let op = |attempt: u32| self.attempt_once(spec, attempt);

        match retry_fixed(&spec.retry, op, classify_attempt).await {
            Ok(result) => Ok(result),
            Err(AttemptError::Fatal(e)) => Err(e),
            Err(AttemptError::Failed(last)) => {
                let attempts = spec.retry.max_attempts();
                if spec.warn_only {
                    warn!(
                        exit_code = last.exit_code,
                        attempts, "command failed on final attempt, continuing (warn only)"
                    );
                    Ok(last)
                } else {
                    Err(RemoteError::ExecutionFailed { attempts, last }.into())
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        spec: &CommandSpec,
        attempt: u32,
    ) -> std::result::Result<CommandResult, AttemptError> {
        info!(
            correlation = spec.correlation.as_deref().unwrap_or("-"),
            attempt,
            command = %spec.loggable_command(),
            "executing remote command"
        );

        let exec = self.remote.exec(&spec.command, spec.privileged);
        let result = match spec.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exec).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(attempt, ?timeout, "remote command attempt timed out");
                    return Err(AttemptError::Failed(CommandResult::timed_out(timeout)));
                }
            },
            None => exec.await,
        };

        match result {
            Ok(result) if result.success() => {
                debug!(attempt, "remote command succeeded");
                Ok(result)
            }
            Ok(result) => {
                if spec.sensitive {
                    debug!(
                        attempt,
                        exit_code = result.exit_code,
                        "remote command failed ({})",
                        SENSITIVE_PLACEHOLDER
                    );
                } else {
                    debug!(
                        attempt,
                        exit_code = result.exit_code,
                        stderr = %redaction::redact(&result.stderr),
                        "remote command failed"
                    );
                }
                Err(AttemptError::Failed(result))
            }
            Err(e) => Err(AttemptError::Fatal(e)),
        }
    }
}
