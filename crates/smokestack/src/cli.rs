use crate::commands;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

/// Target profile selection
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileOption {
    /// CentOS 7 target
    Centos,
    /// Ubuntu 14.04 target
    Ubuntu,
}

impl From<ProfileOption> for smokestack_core::profile::ProfileKind {
    fn from(profile: ProfileOption) -> Self {
        match profile {
            ProfileOption::Centos => smokestack_core::profile::ProfileKind::Centos,
            ProfileOption::Ubuntu => smokestack_core::profile::ProfileKind::Ubuntu,
        }
    }
}

/// Harness subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision a target, deploy the blueprint, and verify it answers
    Run {
        /// Harness configuration file
        #[arg(long, short = 'c', value_name = "PATH")]
        config: PathBuf,

        /// Artifact registry file (defaults to the built-in registry)
        #[arg(long, value_name = "PATH")]
        registry: Option<PathBuf>,

        /// Target profile (overrides config and SMOKESTACK_PROFILE)
        #[arg(long, value_enum)]
        profile: Option<ProfileOption>,

        /// Leave the deployment and manager running after a passing run
        #[arg(long)]
        keep: bool,

        /// Write the run report as JSON to this file
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },
    /// Validate a configuration file without touching any target
    Validate {
        /// Harness configuration file
        #[arg(long, short = 'c', value_name = "PATH")]
        config: PathBuf,
    },
}

/// Smokestack: blueprint deployment verification harness
#[derive(Debug, Parser)]
#[command(name = "smokestack", version, about)]
pub struct Cli {
    /// Log format (text or json, can also be set via SMOKESTACK_LOG_FORMAT)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        if std::env::var_os("SMOKESTACK_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("smokestack={},smokestack_core={}", log_level, log_level),
            );
        }
        smokestack_core::logging::init(log_format)?;

        match self.command {
            Commands::Run {
                config,
                registry,
                profile,
                keep,
                report,
            } => {
                commands::run::execute(commands::run::RunArgs {
                    config,
                    registry,
                    profile: profile.map(Into::into),
                    keep,
                    report,
                })
                .await
            }
            Commands::Validate { config } => commands::validate::execute(&config).await,
        }
    }
}
