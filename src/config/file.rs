//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::profile::{CloudEnvironment, DeviceProfile};
use super::AppConfig;
use crate::models::{CloudEnv, ProductLine};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./nas-qa.yaml",
    "./.nas-qa.yaml",
    "~/.config/nas-qa/config.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Bench devices
    #[serde(default)]
    pub devices: Vec<DeviceProfile>,

    /// Cloud endpoint overrides
    #[serde(default)]
    pub cloud_environments: Vec<CloudEnvironment>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            devices: Vec::new(),
            cloud_environments: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !["1.0", "1.1"].contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        if ProductLine::from_str(&self.app.default_product).is_none() {
            anyhow::bail!("Unknown default product: {}", self.app.default_product);
        }
        if CloudEnv::from_str(&self.app.default_cloud_env).is_none() {
            anyhow::bail!("Unknown default cloud env: {}", self.app.default_cloud_env);
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                anyhow::bail!("Duplicate device profile '{}'", device.name);
            }
            if device.uut_ip.trim().is_empty() {
                anyhow::bail!("Device profile '{}' has no uut_ip", device.name);
            }
            if device.serial.as_ref().is_some_and(|s| s.port == 0) {
                anyhow::bail!("Device profile '{}' has serial port 0", device.name);
            }
        }

        for env in &self.cloud_environments {
            if !env.cloud_url.starts_with("http://") && !env.cloud_url.starts_with("https://") {
                anyhow::bail!("Cloud URL for {} must be http(s): {}", env.env, env.cloud_url);
            }
        }

        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: "1.0".to_string(),
            app: AppConfig {
                logstash_url: Some("http://logstash.example.com:8080".to_string()),
                popcorn_url: Some("https://popcorn.example.com/api/v1/results".to_string()),
                ..AppConfig::default()
            },
            devices: vec![
                DeviceProfile::kamino_example(),
                DeviceProfile::godzilla_example(),
            ],
            cloud_environments: vec![CloudEnvironment::new(
                CloudEnv::Dev1,
                "https://dev1-alt.cloud.example.com",
            )],
        }
    }

    /// Get device profile by name
    pub fn device(&self, name: &str) -> Option<&DeviceProfile> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Cloud URL override for an environment
    pub fn cloud_environment(&self, env: CloudEnv) -> Option<&CloudEnvironment> {
        self.cloud_environments.iter().find(|e| e.env == env)
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
