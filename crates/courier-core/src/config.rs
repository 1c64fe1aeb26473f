//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::prompts::SYSTEM_INSTRUCTION;

/// Env vars checked for the completion API key, in order.
const API_KEY_ENV_VARS: &[&str] = &["OPENROUTER_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram Bot API token (set here or via TELEGRAM_TOKEN)
    #[serde(default)]
    pub telegram_token: Option<String>,

    /// Completion API key (set here or via OPENROUTER_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Chat Completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// How long the visible countdown runs (seconds)
    #[serde(default = "default_countdown")]
    pub countdown_seconds: u64,

    /// Wait before the real completion call is issued (seconds)
    #[serde(default = "default_pre_delay")]
    pub pre_delay_seconds: u64,

    /// Minimum time between two admitted requests of one user (seconds)
    #[serde(default = "default_min_interval")]
    pub request_min_interval_seconds: u64,

    /// Timeout of a single completion call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Leading system message describing the allowed markup
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "deepseek/deepseek-r1-0528:free".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_countdown() -> u64 {
    15
}
fn default_pre_delay() -> u64 {
    10
}
fn default_min_interval() -> u64 {
    15
}
fn default_request_timeout() -> u64 {
    60
}
fn default_system_prompt() -> String {
    SYSTEM_INSTRUCTION.into()
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields defaults (still with
    /// env var overrides applied). A file that exists but fails to parse is
    /// an error.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.is_file() {
            return Self::load(config_path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            self.telegram_token = Some(token);
        }

        // API key: first env var that is set wins, config value otherwise
        if let Some(key) = API_KEY_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
        {
            self.api_key = Some(key);
        }

        if let Ok(m) = std::env::var("COURIER_MODEL") {
            self.model = m;
        }
        if let Ok(url) = std::env::var("COURIER_BASE_URL") {
            self.base_url = url;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.countdown_seconds == 0 {
            anyhow::bail!("countdown_seconds must be at least 1");
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be at least 1");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        Ok(())
    }

    /// Both credentials are needed before the bot can do anything useful.
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        let token = self
            .telegram_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("Telegram token missing: set telegram_token or TELEGRAM_TOKEN")?;
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .context("API key missing: set api_key or OPENROUTER_API_KEY")?;
        Ok((token, key))
    }

    pub fn pre_delay(&self) -> Duration {
        Duration::from_secs(self.pre_delay_seconds)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.request_min_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: None,
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            countdown_seconds: default_countdown(),
            pre_delay_seconds: default_pre_delay(),
            request_min_interval_seconds: default_min_interval(),
            request_timeout_seconds: default_request_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}
