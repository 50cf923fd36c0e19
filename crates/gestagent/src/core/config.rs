//! Configuration loading and management.
//!
//! This module provides utilities for loading plugin system configuration from
//! various sources (TOML, YAML, JSON) and discovering configuration files in the
//! project hierarchy.

use crate::{GestAgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the file [`PluginSystemConfig::discover`] looks for.
pub const CONFIG_FILE_NAME: &str = "gestagent.toml";

/// Plugin system configuration.
///
/// Every field has a default, so a config file only needs the keys it changes.
///
/// # Example
///
/// ```rust
/// use gestagent::core::config::PluginSystemConfig;
///
/// // Create with defaults
/// let config = PluginSystemConfig::default();
/// assert_eq!(config.invocation_timeout_ms, 30_000);
///
/// // Load from TOML file
/// // let config = PluginSystemConfig::from_toml_file("gestagent.toml")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSystemConfig {
    /// Deadline for a whole invocation (validate + process) when the request has none
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,

    /// Deadline for a plugin's `initialize`
    #[serde(default = "default_initialization_timeout_ms")]
    pub initialization_timeout_ms: u64,

    /// How long shutdown waits for in-flight calls, and for the plugin's own `shutdown`
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Re-initialize a plugin that timed out on its next readiness check
    #[serde(default = "default_true")]
    pub reinitialize_suspects: bool,

    /// Concurrent calls allowed per reentrant plugin instance
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: u32,
}

fn default_invocation_timeout_ms() -> u64 {
    30_000
}

fn default_initialization_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_calls() -> u32 {
    1
}

impl Default for PluginSystemConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: default_invocation_timeout_ms(),
            initialization_timeout_ms: default_initialization_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            reinitialize_suspects: true,
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

impl PluginSystemConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn initialization_timeout(&self) -> Duration {
        Duration::from_millis(self.initialization_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Check that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns `GestAgentError::Validation` for a zero timeout or a zero
    /// `max_concurrent_calls`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("invocation_timeout_ms", self.invocation_timeout_ms),
            ("initialization_timeout_ms", self.initialization_timeout_ms),
            ("shutdown_grace_ms", self.shutdown_grace_ms),
        ] {
            if value == 0 {
                return Err(GestAgentError::validation(format!("{} must be greater than 0", name)));
            }
        }

        if self.max_concurrent_calls == 0 {
            return Err(GestAgentError::validation("max_concurrent_calls must be at least 1"));
        }

        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GestAgentError::validation(format!("Invalid TOML in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        let config: Self = serde_yaml_ng::from_str(&content)
            .map_err(|e| GestAgentError::validation(format!("Invalid YAML in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| GestAgentError::validation(format!("Invalid JSON in {}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, picking the format from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("toml") => Self::from_toml_file(path),
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(GestAgentError::validation(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }

    /// Discover configuration file in parent directories.
    ///
    /// Searches for `gestagent.toml` in current directory and parent directories.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(GestAgentError::Io)?;

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "Discovered plugin system config");
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| GestAgentError::validation(format!("Failed to read config file {}: {}", path.display(), e)))
}
