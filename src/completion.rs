//! Completion API Client
//!
//! Text-completion client for an OpenAI-style `/v1/completions` endpoint
//! (Together AI by default). The bot sends one flat prompt and reads back
//! `choices[0].text`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CompletionConfig;

/// One completion call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Request for `prompt` using the configured model parameters
    pub fn from_config(prompt: String, config: &CompletionConfig) -> Self {
        Self {
            prompt,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Completion failures, split the way they are reported to users
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Upstream answered with a non-success HTTP status
    #[error("API returned error code {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream answered 2xx with an error payload
    #[error("Error from AI API: {0}")]
    Api(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion API key not configured")]
    MissingApiKey,

    #[error("completion response had no text")]
    EmptyResponse,
}

/// Anything that turns a prompt into text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// HTTP completion client
#[derive(Clone)]
pub struct TogetherClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl TogetherClient {
    pub fn new(api_url: &str, api_key: Option<&str>, timeout: std::time::Duration) -> Result<Self, CompletionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.map(|s| s.to_string()),
        })
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Result<Self, CompletionError> {
        Self::new(
            &config.completion.api_url,
            config.completion.api_key.as_deref(),
            config.http_timeout,
        )
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionBackend for TogetherClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_ref().ok_or(CompletionError::MissingApiKey)?;

        debug!(
            "Calling completion API: model={}, prompt_len={}",
            request.model,
            request.prompt.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: CompletionResponse = response.json().await?;

        if let Some(error) = result.error {
            return Err(CompletionError::Api(
                error.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.text)
            .map(|t| t.trim().to_string())
            .ok_or(CompletionError::EmptyResponse)?;

        info!("Completion response: model={}, len={}", request.model, text.len());
        Ok(text)
    }
}
