//! Configuration management for flowlens
//!
//! Handles loading, validation, and defaults for the capture run: the ingest
//! socket, the domain scope, and the output budgets. All values are static
//! for a run's lifetime.

use crate::error::{FlowlensError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    pub output: OutputConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Event ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Unix socket the interception layer connects to
    pub socket_path: PathBuf,
    /// Bounded event-channel capacity
    pub buffer_size: usize,
}

/// Capture scope configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Exact hostnames to keep; absent or empty means capture everything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
}

/// Artifact output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the page-batch artifact is written into
    pub directory: PathBuf,
    /// Character budget for textual body excerpts
    pub max_text_excerpt: usize,
    /// Byte budget for inlining binary bodies as base64
    pub max_binary_inline: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FlowlensError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| FlowlensError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| FlowlensError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: FLOWLENS_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("FLOWLENS_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CAPTURE__SOCKET_PATH" => {
                self.capture.socket_path = PathBuf::from(value);
            }
            "SCOPE__ALLOWED_DOMAINS" => {
                let domains: Vec<String> = value
                    .split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect();
                self.scope.allowed_domains = if domains.is_empty() {
                    None
                } else {
                    Some(domains)
                };
            }
            "OUTPUT__DIRECTORY" => {
                self.output.directory = PathBuf::from(value);
            }
            "OUTPUT__MAX_TEXT_EXCERPT" => {
                self.output.max_text_excerpt =
                    value.parse().map_err(|_| FlowlensError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "OUTPUT__MAX_BINARY_INLINE" => {
                self.output.max_binary_inline =
                    value.parse().map_err(|_| FlowlensError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| FlowlensError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("flowlens").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| FlowlensError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".flowlens"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.flowlens");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            capture: CaptureConfig {
                socket_path: data_dir.join("ingest.sock"),
                buffer_size: 10000,
            },
            scope: ScopeConfig {
                allowed_domains: None,
            },
            output: OutputConfig {
                directory: data_dir.join("artifacts"),
                max_text_excerpt: 2000,
                max_binary_inline: 16384,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.scope.allowed_domains = Some(vec!["app.example.com".to_string()]);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(
            loaded.scope.allowed_domains,
            Some(vec!["app.example.com".to_string()])
        );
        assert_eq!(loaded.output.max_text_excerpt, 2000);
    }

    #[test]
    fn test_missing_file_error() {
        let err = Config::load(Path::new("/nonexistent/flowlens.toml")).unwrap_err();
        assert!(matches!(err, FlowlensError::ConfigNotFound { .. }));
    }
}
