//! Readiness polling for freshly provisioned targets
//!
//! A machine that was just created is not immediately reachable: sshd comes
//! up some time after the provider reports the instance running. The poller
//! runs a no-op probe command through [`CommandRunner`] with a short
//! per-attempt timeout and its own retry cadence, distinct from ordinary
//! command retries, because connection refusals here are expected and
//! transient rather than application errors.

use crate::command::{CommandRunner, CommandSpec};
use crate::errors::{RemoteError, Result, SmokestackError};
use crate::retry::RetryPolicy;
use std::time::Duration;
use tracing::{info, instrument};

/// Default probe: cheap, side-effect free, exits 0 once a shell is reachable
pub const DEFAULT_PROBE: &str = "true";

/// Polls a target until it accepts commands
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPoller {
    /// Retry cadence for the probe
    pub retry: RetryPolicy,
    /// Per-attempt timeout; an elapsed timeout consumes one attempt, same as
    /// an explicit probe failure
    pub attempt_timeout: Duration,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(10, Duration::from_secs(30)),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl ReadinessPoller {
    /// Create a poller with explicit retry and timeout parameters
    pub fn new(retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            retry,
            attempt_timeout,
        }
    }

    /// Block until the probe command exits 0 on the target
    ///
    /// Returns on the first successful attempt; fails with
    /// [`RemoteError::Unreachable`] when `retries + 1` consecutive attempts
    /// all fail.
    #[instrument(level = "debug", skip_all, fields(probe = probe))]
    pub async fn wait_until_ready(&self, runner: &CommandRunner, probe: &str) -> Result<()> {
        let spec = CommandSpec::new(probe)
            .retry(self.retry)
            .timeout(self.attempt_timeout)
            .correlation("readiness");

        match runner.execute(&spec).await {
            Ok(_) => {
                info!("target is accepting commands");
                Ok(())
            }
            Err(SmokestackError::Remote(RemoteError::ExecutionFailed { attempts, .. })) => {
                Err(RemoteError::Unreachable { attempts }.into())
            }
            Err(e) => Err(e),
        }
    }
}
