//! Harness configuration
//!
//! One JSON document describes a run: the pre-provisioned target (or the
//! parameters a provider needs), the blueprint to publish, deployment inputs,
//! and the timing knobs for retries and settle delays. Everything that can
//! have a sensible default does; validation catches the rest before any
//! remote operation starts.

use crate::command::RemoteTarget;
use crate::errors::{ConfigError, Result};
use crate::profile::ProfileKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Blueprint archive to publish and deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintSource {
    /// Archive URL handed opaquely to the publish call
    pub archive_url: String,
    /// Root document filename inside the archive
    pub root_doc: String,
}

/// Retry and delay knobs, in seconds where applicable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Readiness probe retries
    #[serde(default = "default_readiness_retries")]
    pub readiness_retries: u32,
    /// Seconds between readiness probes
    #[serde(default = "default_readiness_interval_secs")]
    pub readiness_interval_secs: u64,
    /// Per-probe timeout in seconds
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
    /// Seconds between ordinary command retries
    #[serde(default = "default_command_interval_secs")]
    pub command_interval_secs: u64,
    /// Seconds to wait between deployment create and install
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    /// Retries for the install execution
    #[serde(default = "default_install_retries")]
    pub install_retries: u32,
    /// Retries for the endpoint assertion
    #[serde(default = "default_assert_retries")]
    pub assert_retries: u32,
    /// Seconds between assertion attempts
    #[serde(default = "default_assert_interval_secs")]
    pub assert_interval_secs: u64,
}

fn default_readiness_retries() -> u32 {
    10
}
fn default_readiness_interval_secs() -> u64 {
    30
}
fn default_readiness_timeout_secs() -> u64 {
    20
}
fn default_command_interval_secs() -> u64 {
    30
}
fn default_settle_delay_secs() -> u64 {
    15
}
fn default_install_retries() -> u32 {
    2
}
fn default_assert_retries() -> u32 {
    3
}
fn default_assert_interval_secs() -> u64 {
    3
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            readiness_retries: default_readiness_retries(),
            readiness_interval_secs: default_readiness_interval_secs(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
            command_interval_secs: default_command_interval_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            install_retries: default_install_retries(),
            assert_retries: default_assert_retries(),
            assert_interval_secs: default_assert_interval_secs(),
        }
    }
}

impl TimingConfig {
    /// Interval between readiness probes
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    /// Per-probe timeout
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Interval between ordinary command retries
    pub fn command_interval(&self) -> Duration {
        Duration::from_secs(self.command_interval_secs)
    }

    /// Settle delay between deployment create and install
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Interval between assertion attempts
    pub fn assert_interval(&self) -> Duration {
        Duration::from_secs(self.assert_interval_secs)
    }
}

/// Complete configuration for one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Prefix for the generated run id
    #[serde(default = "default_run_prefix")]
    pub run_prefix: String,
    /// Target distribution profile name
    #[serde(default)]
    pub profile: Option<String>,
    /// The machine to provision against
    pub target: RemoteTarget,
    /// Client package artifact to install on the target
    #[serde(default)]
    pub client_artifact: Option<String>,
    /// Blueprint to publish and deploy
    pub blueprint: BlueprintSource,
    /// Path on the target of the manager blueprint handed to bootstrap;
    /// defaults to the blueprint shipped with the client package
    #[serde(default)]
    pub manager_blueprint_path: Option<String>,
    /// Pass --install-plugins to bootstrap
    #[serde(default = "default_true")]
    pub install_plugins: bool,
    /// Inputs passed to deployment create
    #[serde(default = "empty_object")]
    pub deployment_inputs: Value,
    /// Inputs passed to service bootstrap
    #[serde(default = "empty_object")]
    pub bootstrap_inputs: Value,
    /// Deployment output key naming the assertion endpoint
    #[serde(default = "default_endpoint_output_key")]
    pub endpoint_output_key: String,
    /// Nameservers appended to the target's resolv.conf for the bootstrap
    /// scope; an empty list selects the public resolver defaults
    #[serde(default)]
    pub dns_nameservers: Option<Vec<String>>,
    /// Management admin password; registered for log redaction
    #[serde(default)]
    pub admin_password: Option<String>,
    /// Run uninstall and teardown after a successful pipeline
    #[serde(default = "default_true")]
    pub teardown_on_success: bool,
    /// Retry and delay knobs
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_run_prefix() -> String {
    "smoke".to_string()
}

fn default_endpoint_output_key() -> String {
    "endpoint".to_string()
}

fn default_true() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl HarnessConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::NotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level constraints
    pub fn validate(&self) -> Result<()> {
        if self.target.address.is_empty() {
            return Err(ConfigError::Validation {
                message: "target.address must not be empty".to_string(),
            }
            .into());
        }
        if self.target.user.is_empty() {
            return Err(ConfigError::Validation {
                message: "target.user must not be empty".to_string(),
            }
            .into());
        }
        if self.blueprint.archive_url.is_empty() {
            return Err(ConfigError::Validation {
                message: "blueprint.archive_url must not be empty".to_string(),
            }
            .into());
        }
        if self.blueprint.root_doc.is_empty() {
            return Err(ConfigError::Validation {
                message: "blueprint.root_doc must not be empty".to_string(),
            }
            .into());
        }
        if let Some(profile) = &self.profile {
            profile.parse::<ProfileKind>()?;
        }
        Ok(())
    }

    /// Resolve the profile: configured value or detection default
    pub fn profile_kind(&self) -> Result<ProfileKind> {
        match &self.profile {
            Some(name) => name.parse(),
            None => Ok(ProfileKind::detect(None)),
        }
    }

    /// Artifact name for the client package, defaulting per profile
    pub fn client_artifact_name(&self) -> Result<String> {
        if let Some(name) = &self.client_artifact {
            return Ok(name.clone());
        }
        Ok(format!("{}-cli", self.profile_kind()?))
    }
}
