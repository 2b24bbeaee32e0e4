//! Manager configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::services::is_yaml;

fn default_settings_path() -> PathBuf {
    PathBuf::from("exclusions.json")
}

fn default_bypass_list_path() -> PathBuf {
    PathBuf::from("bypass.txt")
}

/// File locations used by the command line front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Where the exclusions document is persisted
    pub settings_path: PathBuf,
    /// Service catalog, JSON or YAML
    pub catalog_path: Option<PathBuf>,
    /// Full public suffix list; the bundled subset is used when absent
    pub public_suffix_list_path: Option<PathBuf>,
    /// Where the bypass list is written
    pub bypass_list_path: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            catalog_path: None,
            public_suffix_list_path: None,
            bypass_list_path: default_bypass_list_path(),
        }
    }
}

impl ManagerConfig {
    /// Load a configuration file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.settings_path.as_os_str().is_empty() {
            return Err(Error::Config("settings_path must not be empty".to_string()));
        }
        if self.bypass_list_path.as_os_str().is_empty() {
            return Err(Error::Config("bypass_list_path must not be empty".to_string()));
        }
        Ok(())
    }
}
