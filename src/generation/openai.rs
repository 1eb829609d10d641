//! OpenAI-compatible chat completions backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::{GenerationClient, GenerationError, Sampling, extract_text, http_client, mask_token, send_json};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    sampling: Sampling,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        sampling: Sampling,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let base_url = base_url
            .unwrap_or_else(|| OPENAI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            base_url,
            sampling,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.sampling.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: self.sampling.max_tokens,
            temperature: self.sampling.temperature,
        };

        info!(
            model = %self.sampling.model,
            api_key = %mask_token(&self.api_key),
            prompt_len = prompt.len(),
            "OpenAI chat completion request"
        );

        let payload = send_json(
            self.client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        extract_text(&payload, "/choices/0/message/content")
    }
}
