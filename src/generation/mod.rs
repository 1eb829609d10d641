//! Generation module - LLM completion backends
//!
//! Backends:
//! - OpenAI-compatible chat completions (`openai`)
//! - Yandex foundation models completion (`yandex`)
//!
//! Every call is a single attempt. Failures are returned as [`GenerationError`],
//! never panics.

pub mod openai;
pub mod yandex;

pub use openai::OpenAiClient;
pub use yandex::YandexClient;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("upstream returned {code}: {body}")]
    UpstreamStatus { code: u16, body: String },
    #[error("response has no generated text")]
    UnexpectedShape,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        GenerationError::Transport(e.to_string())
    }
}

/// Text generation capability consumed by the conversation
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Sampling parameters shared by both backends
#[derive(Debug, Clone)]
pub struct Sampling {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Masks an API key for logging: first 7 chars + "***" + last 4 chars.
/// Keys of 11 chars or fewer are fully hidden.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

/// HTTP client with the request timeout applied
pub(crate) fn http_client(timeout: Duration) -> Result<Client, GenerationError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Send the request once and parse the body as JSON.
///
/// Non-2xx status becomes `UpstreamStatus`; an unparsable body is a `Transport` error.
pub(crate) async fn send_json(request: RequestBuilder) -> Result<Value, GenerationError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    debug!(status = status.as_u16(), body = %body, "generation raw response");

    if !status.is_success() {
        return Err(GenerationError::UpstreamStatus {
            code: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| GenerationError::Transport(format!("malformed payload: {}", e)))
}

/// Pull a non-blank string out of the payload by JSON pointer
pub(crate) fn extract_text(payload: &Value, pointer: &str) -> Result<String, GenerationError> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .ok_or(GenerationError::UnexpectedShape)
}
