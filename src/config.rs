//! Configuration file support for cardbox
//!
//! Reads from .cardbox/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM completion endpoint settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Authentication settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    /// Default: 8088
    #[serde(default = "default_port")]
    pub port: u16,
}

/// LLM completion endpoint configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    /// Chat-completion endpoint URL (OpenRouter-compatible)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key. The CARDBOX_API_KEY env var takes priority over this value.
    #[serde(default)]
    pub api_key: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Retry attempts for retryable failures
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Authentication configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// Session lifetime in days
    /// Default: 7
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

fn default_port() -> u16 {
    8088
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_retries() -> u32 {
    3
}

fn default_session_ttl_days() -> i64 {
    7
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            retries: default_retries(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { session_ttl_days: default_session_ttl_days() }
    }
}

impl Config {
    /// Load config from .cardbox/config.toml, then apply env overrides.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Self {
        let mut config = Self::load_file().unwrap_or_default();
        if let Ok(key) = std::env::var("CARDBOX_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = key;
            }
        }
        config
    }

    fn load_file() -> Option<Self> {
        let path = Self::find_config_path()?;
        let contents = std::fs::read_to_string(&path).ok()?;
        toml::from_str(&contents).ok()
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".cardbox").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Starter config written by `cardbox init`
    pub fn starter_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
