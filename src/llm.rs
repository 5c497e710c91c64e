//! Language-model client
//!
//! Trait seam over answer-synthesis backends plus an Anthropic messages-API
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("language model request failed: {0}")]
    Http(String),
    #[error("language model returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("language model response missing text content")]
    MissingContent,
    #[error("malformed language model response: {0}")]
    BadResponse(String),
    #[error("invalid language model configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

/// An answer-synthesis backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce a free-text completion for the prompt.
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError>;
}

/// Anthropic messages-API client.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, temperature: f32) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("missing Anthropic API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(LlmError::Config("missing Anthropic model name".to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| LlmError::Config("invalid Anthropic API key".to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens,
            temperature: self.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: prompt,
                }],
            }],
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "language model call");
        let resp = self
            .http
            .post(ANTHROPIC_URL)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(LlmError::Service {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if answer.is_empty() {
            return Err(LlmError::MissingContent);
        }
        Ok(answer)
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
