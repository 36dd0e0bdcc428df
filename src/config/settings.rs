use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Builder;

/// Registry that hosts the certified base images
pub const DEFAULT_BASE_REGISTRY: &str = "registry.access.redhat.com";

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine binary used for every operation (docker or podman)
    #[serde(default)]
    pub builder: Builder,
    /// Upper bound in seconds for a single engine invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Registry host prefixed to the inferred base image name
    #[serde(default = "default_base_registry")]
    pub base_registry: String,
    /// Where exported image filesystems are written (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_base_registry() -> String {
    DEFAULT_BASE_REGISTRY.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            builder: Builder::default(),
            timeout_secs: default_timeout_secs(),
            base_registry: default_base_registry(),
            scratch_dir: None,
        }
    }
}

impl EngineConfig {
    /// Reject settings no engine call could run under
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("engine timeout_secs must be at least 1");
        }
        if self.base_registry.trim().is_empty() {
            anyhow::bail!("engine base_registry must not be empty");
        }
        Ok(())
    }
}

impl CliConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CliConfig = serde_yaml::from_str(&content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to the user config file and then defaults.
    ///
    /// An explicitly given path must exist.
    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/opcert/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("opcert").join("config.yaml"))
    }
}
