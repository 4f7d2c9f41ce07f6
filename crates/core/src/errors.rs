//! Error types and handling
//!
//! This module provides domain-specific error types for the provisioning
//! harness. The taxonomy is structured with specific error enums for each
//! domain (Configuration, Remote execution, Deployment lifecycle, REST) that
//! are then wrapped in the main SmokestackError enum for unified handling.
//!
//! Configuration errors are raised before any remote operation begins and are
//! allowed to escape the pipeline; every other kind is captured by the staged
//! pipeline and surfaced through a structured outcome.

use crate::command::CommandResult;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is absent
    #[error("{variable} environment variable not set")]
    MissingEnv { variable: String },

    /// Configuration file parsing error
    #[error("Failed to parse harness configuration: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Artifact name not present in the package registry
    #[error("Unknown artifact: {name}")]
    UnknownArtifact { name: String },
}

/// Remote command execution errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Command failed after all retry attempts were exhausted
    #[error("remote command exited with code {code} after {attempts} attempt(s)", code = last.exit_code)]
    ExecutionFailed { attempts: u32, last: CommandResult },

    /// Readiness probe exhausted all attempts without the target responding
    #[error("target not reachable after {attempts} attempt(s)")]
    Unreachable { attempts: u32 },

    /// The transport itself could not be started (e.g. ssh binary missing)
    #[error("failed to spawn remote transport: {message}")]
    Spawn { message: String },

    /// File upload to the target failed
    #[error("failed to upload {path} to target: {message}")]
    Upload { path: String, message: String },
}

/// Deployment lifecycle errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Service bootstrap did not report completion
    #[error("service bootstrap failed: {message}")]
    Bootstrap { message: String },

    /// Blueprint archive publish failed
    #[error("artifact publish failed: {message}")]
    Publish { message: String },

    /// Deployment creation failed
    #[error("deployment create failed: {message}")]
    Create { message: String },

    /// Deployment install execution failed
    #[error("deployment install failed: {message}")]
    Install { message: String },

    /// Deployment uninstall execution failed
    #[error("deployment uninstall failed: {message}")]
    Uninstall { message: String },

    /// Service teardown failed
    #[error("service teardown failed: {message}")]
    Teardown { message: String },

    /// Deployed application did not answer with a successful response
    #[error("deployment assertion failed: {message}")]
    Assertion { message: String },

    /// Guard against illegal state machine transitions
    #[error("invalid deployment state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Management REST API errors
#[derive(Error, Debug)]
pub enum RestError {
    /// Transport-level HTTP error
    #[error("management API request failed")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the management API
    #[error("management API returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Deployment outputs do not contain the requested key
    #[error("deployment outputs missing key: {key}")]
    MissingOutput { key: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum SmokestackError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote command execution errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Deployment lifecycle errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Management REST API errors
    #[error("REST error: {0}")]
    Rest(#[from] RestError),

    /// Internal/generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SmokestackError {
    /// Whether this error must escape the pipeline rather than become a
    /// failed outcome. Configuration errors abort before any resource is
    /// created, so no compensation is needed or wanted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SmokestackError::Config(_))
    }
}

/// Convenience type alias for Results with SmokestackError
pub type Result<T> = std::result::Result<T, SmokestackError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingEnv {
            variable: "CENTOS_CLI_PACKAGE_URL".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "CENTOS_CLI_PACKAGE_URL environment variable not set"
        );

        let error = ConfigError::NotFound {
            path: "/path/to/harness.json".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration file not found: /path/to/harness.json"
        );
    }

    #[test]
    fn test_remote_error_display() {
        let error = RemoteError::ExecutionFailed {
            attempts: 3,
            last: CommandResult::new(1, String::new(), "boom".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "remote command exited with code 1 after 3 attempt(s)"
        );

        let error = RemoteError::Unreachable { attempts: 11 };
        assert_eq!(
            format!("{}", error),
            "target not reachable after 11 attempt(s)"
        );
    }

    #[test]
    fn test_lifecycle_error_display() {
        let error = LifecycleError::Bootstrap {
            message: "completion marker missing".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "service bootstrap failed: completion marker missing"
        );

        let error = LifecycleError::InvalidTransition {
            from: "UNINSTALLED".to_string(),
            to: "INSTALLING".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "invalid deployment state transition: UNINSTALLED -> INSTALLING"
        );
    }

    #[test]
    fn test_wrapping_from_domain_errors() {
        let config_error = ConfigError::Validation {
            message: "test".to_string(),
        };
        let wrapped: SmokestackError = config_error.into();
        assert!(matches!(wrapped, SmokestackError::Config(_)));
        assert!(wrapped.is_configuration());

        let remote_error = RemoteError::Unreachable { attempts: 1 };
        let wrapped: SmokestackError = remote_error.into();
        assert!(matches!(wrapped, SmokestackError::Remote(_)));
        assert!(!wrapped.is_configuration());

        let lifecycle_error = LifecycleError::Publish {
            message: "test".to_string(),
        };
        let wrapped: SmokestackError = lifecycle_error.into();
        assert!(matches!(wrapped, SmokestackError::Lifecycle(_)));
    }

    #[test]
    fn test_anyhow_conversions() {
        let error = LifecycleError::Install {
            message: "execution failed".to_string(),
        };
        let anyhow_error = anyhow::Error::from(SmokestackError::Lifecycle(error));
        assert!(anyhow_error.to_string().contains("Lifecycle error"));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_error = ConfigError::Io(io_error);
        let wrapped = SmokestackError::Config(config_error);

        assert!(wrapped.source().is_some());
        if let Some(source) = wrapped.source() {
            assert!(source.source().is_some());
        }
    }
}
