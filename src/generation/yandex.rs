//! Yandex foundation models completion backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::{GenerationClient, GenerationError, Sampling, extract_text, http_client, mask_token, send_json};

pub const YANDEX_API_BASE: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1";

#[derive(Debug, Clone)]
pub struct YandexClient {
    client: Client,
    api_key: String,
    folder_id: String,
    base_url: String,
    sampling: Sampling,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f32,
    // int64 is sent as a string in this API
    max_tokens: String,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    text: &'a str,
}

impl YandexClient {
    pub fn new(
        api_key: String,
        folder_id: String,
        base_url: Option<String>,
        sampling: Sampling,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let base_url = base_url
            .unwrap_or_else(|| YANDEX_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            folder_id,
            base_url,
            sampling,
        })
    }

    /// `gpt://<folder>/<model>`
    pub fn model_uri(&self) -> String {
        format!("gpt://{}/{}", self.folder_id, self.sampling.model)
    }
}

#[async_trait]
impl GenerationClient for YandexClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = CompletionRequest {
            model_uri: self.model_uri(),
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.sampling.temperature,
                max_tokens: self.sampling.max_tokens.to_string(),
            },
            messages: [Message { role: "user", text: prompt }],
        };

        info!(
            model_uri = %request.model_uri,
            api_key = %mask_token(&self.api_key),
            prompt_len = prompt.len(),
            "Yandex completion request"
        );

        let payload = send_json(
            self.client
                .post(format!("{}/completion", self.base_url))
                .header("Authorization", format!("Api-Key {}", self.api_key))
                .header("x-folder-id", &self.folder_id)
                .json(&request),
        )
        .await?;

        extract_text(&payload, "/result/alternatives/0/message/text")
    }
}
