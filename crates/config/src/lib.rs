//! Configuration loading, validation, and management for parley.
//!
//! Loads configuration from `~/.parley/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM backend: "ollama" or "openai"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name passed to the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Chat engine settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Session store settings
    #[serde(default)]
    pub session: SessionConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific endpoint overrides
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("chat", &self.chat)
            .field("session", &self.session)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("rate_limit_per_window", &self.rate_limit_per_window)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_max_age_secs", &self.cookie_max_age_secs)
            .field("session_secret", &redact(&self.session_secret))
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Settings for the tool-calling orchestrator and per-session bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Absent = backend default, -1 = unlimited, otherwise a positive limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,

    /// Inference calls allowed per user turn
    #[serde(default = "default_max_chat_steps")]
    pub max_chat_steps: u32,

    /// Refuse model calls until a context has been loaded
    #[serde(default)]
    pub require_context: bool,

    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Entries dropped when the cache is full; absent means a tenth of
    /// `cache_capacity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_eviction_batch: Option<usize>,

    /// Directory holding the documents `bot-context load` can read
    #[serde(default = "default_contexts_dir")]
    pub contexts_dir: PathBuf,

    /// Upper bound on one inference call; 0 disables the timeout
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_chat_steps() -> u32 {
    5
}
fn default_max_history() -> usize {
    500
}
fn default_cache_capacity() -> usize {
    1000
}
fn default_contexts_dir() -> PathBuf {
    PathBuf::from("contexts")
}
fn default_llm_timeout_secs() -> u64 {
    120
}

impl ChatConfig {
    /// The configured eviction batch, or a tenth of the capacity.
    pub fn eviction_batch(&self) -> usize {
        self.cache_eviction_batch
            .unwrap_or((self.cache_capacity / 10).max(1))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            max_chat_steps: default_max_chat_steps(),
            require_context: false,
            max_history: default_max_history(),
            cache_capacity: default_cache_capacity(),
            cache_eviction_batch: None,
            contexts_dir: default_contexts_dir(),
            llm_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for this long are evicted; 0 keeps them forever
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Root for per-session scratch directories (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

fn default_idle_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            scratch_dir: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Requests allowed per session within one window
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_window: usize,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_cookie_max_age_secs")]
    pub cookie_max_age_secs: u64,

    /// Key used to sign session cookies; a random one is generated at
    /// startup when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_secret: Option<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_rate_limit() -> usize {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}
fn default_cookie_name() -> String {
    "parley.sid".into()
}
fn default_cookie_max_age_secs() -> u64 {
    24 * 60 * 60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            rate_limit_per_window: default_rate_limit(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            cookie_name: default_cookie_name(),
            cookie_max_age_secs: default_cookie_max_age_secs(),
            session_secret: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load configuration from `path`, then apply environment overrides:
    /// - `PARLEY_API_KEY`, then `OPENAI_API_KEY` (only if no key is configured)
    /// - `PARLEY_PROVIDER`, `PARLEY_MODEL`
    /// - `PARLEY_SESSION_SECRET` (session cookie signing key)
    /// - `OLLAMA_HOST` (endpoint of the ollama provider)
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PARLEY_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            config.model = model;
        }

        if let Ok(secret) = std::env::var("PARLEY_SESSION_SECRET") {
            config.gateway.session_secret = Some(secret);
        }

        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            config.providers.entry("ollama".into()).or_default().api_url = Some(host);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chat = &self.chat;
        if !(0.0..=2.0).contains(&chat.temperature) {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&chat.top_p) {
            return Err(ConfigError::ValidationError(
                "chat.top_p must be between 0.0 and 1.0".into(),
            ));
        }
        if let Some(max) = chat.max_tokens
            && max != -1
            && max <= 0
        {
            return Err(ConfigError::ValidationError(
                "chat.max_tokens must be positive, or -1 for unlimited".into(),
            ));
        }
        if chat.max_chat_steps == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_chat_steps must be at least 1".into(),
            ));
        }
        if chat.max_history < 2 {
            return Err(ConfigError::ValidationError(
                "chat.max_history must be at least 2".into(),
            ));
        }
        if chat.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "chat.cache_capacity must be at least 1".into(),
            ));
        }
        if let Some(batch) = chat.cache_eviction_batch
            && (batch == 0 || batch > chat.cache_capacity)
        {
            return Err(ConfigError::ValidationError(
                "chat.cache_eviction_batch must be between 1 and chat.cache_capacity".into(),
            ));
        }
        if !matches!(self.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "unknown provider '{}' (expected 'ollama' or 'openai')",
                self.provider
            )));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            model: default_model(),
            chat: ChatConfig::default(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.chat.cache_capacity, 1000);
        assert_eq!(config.chat.cache_eviction_batch, None);
        assert_eq!(config.chat.eviction_batch(), 100);
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.chat.max_history, config.chat.max_history);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.chat.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_tokens_accepts_unlimited_but_not_zero() {
        let mut config = AppConfig::default();
        config.chat.max_tokens = Some(-1);
        assert!(config.validate().is_ok());
        config.chat.max_tokens = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let mut config = AppConfig::default();
        config.chat.max_chat_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = AppConfig {
            provider: "carrier-pigeon".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, "ollama");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
model = "mixtral:8x7b"

[chat]
require_context = true
max_chat_steps = 3
"#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "mixtral:8x7b");
        assert!(config.chat.require_context);
        assert_eq!(config.chat.max_chat_steps, 3);
        assert_eq!(config.chat.max_history, 500);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chat = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn eviction_batch_follows_capacity() {
        let mut config = AppConfig::default();
        config.chat.cache_capacity = 50;
        assert!(config.validate().is_ok());
        assert_eq!(config.chat.eviction_batch(), 5);

        config.chat.cache_capacity = 3;
        assert_eq!(config.chat.eviction_batch(), 1);
    }

    #[test]
    fn eviction_batch_larger_than_capacity_rejected() {
        let mut config = AppConfig::default();
        config.chat.cache_capacity = 50;
        config.chat.cache_eviction_batch = Some(100);
        assert!(config.validate().is_err());
        config.chat.cache_eviction_batch = Some(0);
        assert!(config.validate().is_err());
        config.chat.cache_eviction_batch = Some(50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_session_secret() {
        let mut config = AppConfig::default();
        config.gateway.session_secret = Some("hunter2".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("llama3.1"));
        assert!(toml_str.contains("max_chat_steps"));
    }
}
