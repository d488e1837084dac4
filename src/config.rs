//! Tripagent configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main tripagent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level filter, overridden by --log-level
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Auth service configuration
    pub auth: AuthConfig,

    /// NLP extraction service configuration
    pub nlp: NlpConfig,

    /// Flight and hotel inventory configuration
    pub search: SearchConfig,

    /// Gateway HTTP behavior
    pub http: HttpConfig,

    /// Credential storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripagent.yml
        let local_config = PathBuf::from(".tripagent.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripagent/tripagent.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripagent").join("tripagent.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Auth service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Auth service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Login/refresh request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Upper bound on a whole refresh attempt, waiters included
    #[serde(rename = "refresh-timeout-ms")]
    pub refresh_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 10_000,
            refresh_timeout_ms: 15_000,
        }
    }
}

/// NLP extraction service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    /// Extraction service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Flight and hotel inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Inventory API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-modality search timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Results per page requested from the inventory API
    #[serde(rename = "page-size")]
    pub page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 20_000,
            page_size: 20,
        }
    }
}

/// Gateway HTTP behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries after the initial attempt for transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles per retry
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Credential file path; defaults to ~/.config/tripagent/credentials.json
    #[serde(rename = "credentials-path")]
    pub credentials_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.search.page_size, 20);
        assert!(config.storage.credentials_path.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

auth:
  base-url: https://auth.example.com
  timeout-ms: 5000
  refresh-timeout-ms: 8000

search:
  base-url: https://api.example.com
  page-size: 50

http:
  max-retries: 1
  initial-backoff-ms: 100
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.auth.base_url, "https://auth.example.com");
        assert_eq!(config.auth.refresh_timeout_ms, 8000);
        assert_eq!(config.search.page_size, 50);
        assert_eq!(config.http.max_retries, 1);
        assert_eq!(config.http.initial_backoff_ms, 100);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
search:
  base-url: https://api.example.com
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.search.base_url, "https://api.example.com");

        // Defaults for unspecified
        assert_eq!(config.search.page_size, 20);
        assert_eq!(config.http.timeout_ms, 30_000);
        assert_eq!(config.auth.base_url, "http://localhost:8000");
    }
}
