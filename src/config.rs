//! Service configuration
//!
//! Loaded from a TOML file. Secrets are never stored in the file: the `llm`
//! section names the environment variable holding the API key, which is
//! resolved at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main service configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub store: StoreSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub workers: WorkerSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// HTTP service section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Listening port; the `PORT` environment variable takes precedence
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Environment variable holding one extra allowed origin
    pub frontend_url_env: Option<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            cors_origins: Vec::new(),
            frontend_url_env: None,
        }
    }
}

fn default_service_name() -> String {
    "crewline".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// Task record store section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    pub backend: StoreBackend,
    /// Connection URL (sqlite backend only)
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            url: default_store_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_store_url() -> String {
    "sqlite://crewline.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// LLM backend section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Optional max tokens per completion
    pub max_tokens: Option<u32>,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

/// Background worker pool section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

/// Step retry policy for transient failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Total attempts per step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause between attempts in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "service.port must be non-zero".to_string(),
            ));
        }
        if self.workers.count == 0 {
            return Err(ConfigError::InvalidConfig(
                "workers.count must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !matches!(self.llm.provider.as_str(), "openai" | "anthropic") {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported llm.provider '{}'",
                self.llm.provider
            )));
        }
        if let Some(temperature) = self.llm.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "llm.temperature {temperature} outside 0.0..=2.0"
                )));
            }
        }
        if self.store.backend == StoreBackend::Sqlite && !self.store.url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidConfig(format!(
                "store.url '{}' is not a sqlite URL",
                self.store.url
            )));
        }
        Ok(())
    }

    /// Helper method to get environment variable with error propagation
    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Port to listen on, honoring the `PORT` environment variable
    pub fn effective_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .filter(|p| *p != 0)
            .unwrap_or(self.service.port)
    }

    /// Configured CORS origins plus the optional frontend URL
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = self.service.cors_origins.clone();
        if let Some(url) = self
            .service
            .frontend_url_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|url| !url.trim().is_empty())
        {
            origins.push(url);
        }
        origins
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[store]
backend = "memory"

[llm]
provider = "openai"
model = "gpt-3.5-turbo"
api_key_env = "CREWLINE_TEST_OPENAI_KEY"
temperature = 0.3

[workers]
count = 2
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}
