//! Package/version registry
//!
//! Read-only mapping from artifact name to the metadata the harness needs to
//! install and bootstrap it: version, destination directory, and the install
//! script to run. The download URL itself always comes from a per-artifact
//! environment variable so CI can point runs at freshly built packages; a
//! missing variable is a hard configuration error raised before any remote
//! operation begins.

use crate::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One registry entry, keyed by artifact name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Artifact version string
    pub version: String,
    /// Directory the artifact is unpacked into on the target
    pub destination_dir: String,
    /// Install script reference, run after download
    #[serde(default)]
    pub install_script: Option<String>,
}

/// The registry of supported artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactRegistry {
    #[serde(flatten)]
    entries: HashMap<String, ArtifactEntry>,
}

/// A registry entry with its download URL resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Artifact name
    pub name: String,
    /// Download URL from the artifact's environment variable
    pub source_url: String,
    /// Registry metadata
    pub entry: ArtifactEntry,
}

/// Environment variable carrying an artifact's download URL
///
/// Uppercased, dashes replaced with underscores, suffixed `_PACKAGE_URL`:
/// `centos-cli` resolves through `CENTOS_CLI_PACKAGE_URL`.
pub fn package_url_env_var(artifact: &str) -> String {
    format!(
        "{}_PACKAGE_URL",
        artifact.to_uppercase().replace('-', "_")
    )
}

impl ArtifactRegistry {
    /// Registry with the artifacts the harness supports out of the box
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "centos-cli".to_string(),
            ArtifactEntry {
                version: "3.1.0".to_string(),
                destination_dir: "/cloudify-cli".to_string(),
                install_script: Some("install_cli.sh".to_string()),
            },
        );
        entries.insert(
            "ubuntu-cli".to_string(),
            ArtifactEntry {
                version: "3.1.0".to_string(),
                destination_dir: "/cloudify-cli".to_string(),
                install_script: Some("install_cli.sh".to_string()),
            },
        );
        Self { entries }
    }

    /// Load a registry from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::NotFound {
            path: path.display().to_string(),
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a registry from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let registry: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parsing {
                message: format!("artifact registry: {}", e),
            })?;
        Ok(registry)
    }

    /// Look up an entry without resolving its URL
    pub fn get(&self, name: &str) -> Option<&ArtifactEntry> {
        self.entries.get(name)
    }

    /// Number of registered artifacts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an artifact: registry metadata plus the download URL from the
    /// artifact's environment variable
    pub fn resolve(&self, name: &str) -> Result<ResolvedArtifact> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::UnknownArtifact {
                name: name.to_string(),
            })?;

        let variable = package_url_env_var(name);
        let source_url =
            std::env::var(&variable).map_err(|_| ConfigError::MissingEnv { variable })?;

        Ok(ResolvedArtifact {
            name: name.to_string(),
            source_url,
            entry: entry.clone(),
        })
    }
}
