//! Target distribution profiles
//!
//! Provisioned images differ per distribution: login user, working
//! directory, the bootstrap input key naming the client package, the image
//! to boot, and how a package is installed. Each supported distribution
//! implements [`TargetProfile`];
//! [`ProfileKind`] selects one from configuration or an environment
//! variable.

use crate::errors::{ConfigError, SmokestackError};

/// Distribution-specific parameters of a target image
pub trait TargetProfile: Send + Sync {
    /// Profile name (e.g. "centos", "ubuntu")
    fn name(&self) -> &'static str;

    /// Login user the image ships with
    fn default_user(&self) -> &'static str;

    /// Directory the client tooling is installed and run from
    fn client_work_dir(&self) -> String;

    /// Bootstrap input key naming the client package URL
    fn package_parameter_name(&self) -> &'static str;

    /// Image a cloud provider should boot for this profile
    fn image_name(&self) -> &'static str;

    /// Command installing the client package from a URL
    fn install_client_command(&self, package_url: &str) -> String;
}

/// CentOS 7 profile
#[derive(Debug, Clone, Copy, Default)]
pub struct CentosProfile;

impl TargetProfile for CentosProfile {
    fn name(&self) -> &'static str {
        "centos"
    }

    fn default_user(&self) -> &'static str {
        "centos"
    }

    fn client_work_dir(&self) -> String {
        format!("/home/{}", self.default_user())
    }

    fn package_parameter_name(&self) -> &'static str {
        "centos_cli_package_url"
    }

    fn image_name(&self) -> &'static str {
        "centos-7"
    }

    fn install_client_command(&self, package_url: &str) -> String {
        format!("rpm -i {}", package_url)
    }
}

/// Ubuntu profile
#[derive(Debug, Clone, Copy, Default)]
pub struct UbuntuProfile;

impl TargetProfile for UbuntuProfile {
    fn name(&self) -> &'static str {
        "ubuntu"
    }

    fn default_user(&self) -> &'static str {
        "ubuntu"
    }

    fn client_work_dir(&self) -> String {
        format!("/home/{}", self.default_user())
    }

    fn package_parameter_name(&self) -> &'static str {
        "ubuntu_cli_package_url"
    }

    fn image_name(&self) -> &'static str {
        "ubuntu-trusty"
    }

    fn install_client_command(&self, package_url: &str) -> String {
        format!(
            "curl -fsS -o /tmp/client.deb {} && dpkg -i /tmp/client.deb",
            package_url
        )
    }
}

/// Profile selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// CentOS target image
    Centos,
    /// Ubuntu target image
    Ubuntu,
}

impl ProfileKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Centos => "centos",
            Self::Ubuntu => "ubuntu",
        }
    }

    /// Instantiate the concrete profile
    pub fn profile(&self) -> ProfileImpl {
        match self {
            Self::Centos => ProfileImpl::Centos(CentosProfile),
            Self::Ubuntu => ProfileImpl::Ubuntu(UbuntuProfile),
        }
    }

    /// Detect profile from CLI flag, environment variable, or default
    ///
    /// Precedence: CLI flag > SMOKESTACK_PROFILE env var > default (centos)
    pub fn detect(cli_profile: Option<ProfileKind>) -> ProfileKind {
        if let Some(profile) = cli_profile {
            return profile;
        }

        if let Ok(env_profile) = std::env::var("SMOKESTACK_PROFILE") {
            if let Ok(profile) = env_profile.parse() {
                return profile;
            }
        }

        ProfileKind::Centos
    }
}

impl std::str::FromStr for ProfileKind {
    type Err = SmokestackError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "centos" => Ok(Self::Centos),
            "ubuntu" => Ok(Self::Ubuntu),
            _ => Err(ConfigError::Validation {
                message: format!(
                    "Unknown profile: {}. Supported profiles: centos, ubuntu",
                    s
                ),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete profile implementation enum
#[derive(Debug, Clone, Copy)]
pub enum ProfileImpl {
    /// CentOS profile
    Centos(CentosProfile),
    /// Ubuntu profile
    Ubuntu(UbuntuProfile),
}

impl TargetProfile for ProfileImpl {
    fn name(&self) -> &'static str {
        match self {
            Self::Centos(p) => p.name(),
            Self::Ubuntu(p) => p.name(),
        }
    }

    fn default_user(&self) -> &'static str {
        match self {
            Self::Centos(p) => p.default_user(),
            Self::Ubuntu(p) => p.default_user(),
        }
    }

    fn client_work_dir(&self) -> String {
        match self {
            Self::Centos(p) => p.client_work_dir(),
            Self::Ubuntu(p) => p.client_work_dir(),
        }
    }

    fn package_parameter_name(&self) -> &'static str {
        match self {
            Self::Centos(p) => p.package_parameter_name(),
            Self::Ubuntu(p) => p.package_parameter_name(),
        }
    }

    fn image_name(&self) -> &'static str {
        match self {
            Self::Centos(p) => p.image_name(),
            Self::Ubuntu(p) => p.image_name(),
        }
    }

    fn install_client_command(&self, package_url: &str) -> String {
        match self {
            Self::Centos(p) => p.install_client_command(package_url),
            Self::Ubuntu(p) => p.install_client_command(package_url),
        }
    }
}
