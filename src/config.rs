//! Startup configuration - CLI flags with environment fallbacks

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::generation::{GenerationClient, GenerationError, OpenAiClient, Sampling, YandexClient};
use crate::session::DEFAULT_HISTORY_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Openai,
    Yandex,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Openai => "gpt-4o",
            Provider::Yandex => "yandexgpt-lite",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("--folder-id (YANDEX_FOLDER_ID) is required for the yandex provider")]
    MissingFolderId,
    #[error("temperature {0} is outside 0.0..=2.0")]
    Temperature(f32),
    #[error("--timeout-secs must be at least 1")]
    Timeout,
    #[error("failed to build generation client: {0}")]
    Client(#[from] GenerationError),
}

#[derive(Parser, Debug)]
#[command(name = "trenerbot")]
#[command(author, version, about = "Телеграм-тренер: план тренировки по цели, уровню и параметрам тела")]
pub struct Config {
    /// Telegram bot token
    #[arg(long, env = "TELOXIDE_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Text generation backend
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value = "openai")]
    pub provider: Provider,

    /// API key of the generation backend
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Yandex Cloud folder id, used to build the model URI
    #[arg(long, env = "YANDEX_FOLDER_ID")]
    pub folder_id: Option<String>,

    /// Model name (defaults depend on the provider)
    #[arg(long, env = "LLM_MODEL")]
    pub model: Option<String>,

    /// Override the API base URL (proxies, compatible servers)
    #[arg(long, env = "LLM_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, default_value_t = 300)]
    pub max_tokens: u32,

    /// Generation request timeout
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Stored workouts per user, 0 = unbounded
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub history_limit: usize,

    /// Drop sessions idle for this long, 0 = never
    #[arg(long, default_value_t = 24)]
    pub session_ttl_hours: u32,
}

impl Config {
    /// Checks that clap cannot express; run once before starting the bot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Empty("telegram token"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Empty("api key"));
        }
        if self.provider == Provider::Yandex && self.folder_id.as_deref().is_none_or(|f| f.trim().is_empty()) {
            return Err(ConfigError::MissingFolderId);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Timeout);
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(self.provider.default_model())
    }

    pub fn session_ttl(&self) -> Option<chrono::Duration> {
        (self.session_ttl_hours > 0).then(|| chrono::Duration::hours(i64::from(self.session_ttl_hours)))
    }

    pub fn generation_client(&self) -> Result<Arc<dyn GenerationClient>, ConfigError> {
        let sampling = Sampling {
            model: self.model().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let timeout = Duration::from_secs(self.timeout_secs);

        let client: Arc<dyn GenerationClient> = match self.provider {
            Provider::Openai => Arc::new(OpenAiClient::new(
                self.api_key.clone(),
                self.base_url.clone(),
                sampling,
                timeout,
            )?),
            Provider::Yandex => {
                let folder_id = self.folder_id.clone().ok_or(ConfigError::MissingFolderId)?;
                Arc::new(YandexClient::new(
                    self.api_key.clone(),
                    folder_id,
                    self.base_url.clone(),
                    sampling,
                    timeout,
                )?)
            }
        };
        Ok(client)
    }
}
