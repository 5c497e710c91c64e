//! Embedding client for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EmbedError, Embedder, Embedding};

/// Base delay for exponential retry backoff.
const BACKOFF_BASE_MS: u64 = 500;
/// Cap on the backoff exponent.
const BACKOFF_MAX_SHIFT: u32 = 5;

/// HTTP embeddings client for OpenAI-compatible services.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    http: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: usize,
}

impl OpenAiEmbedder {
    /// Build a new embeddings client.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, EmbedError> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing embedding API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(EmbedError::Config("missing embedding model name".to_string()));
        }
        if dimension == 0 {
            return Err(EmbedError::Config("dimension must be positive".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::Config("invalid embedding API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            max_retries: max_retries.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_version(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        let mut attempt = 0usize;

        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: text,
                dimensions: Some(self.dimension),
            };

            match self.http.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .map_err(|e| EmbedError::BadResponse(e.to_string()))?;
                        return validate_vector(parsed, self.dimension);
                    }

                    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(status = %status, attempt, "embedding request failed; retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbedError::Service {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if is_retryable(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request errored; retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    debug!(error = %err, "embedding request gave up");
                    return Err(err.into());
                }
            }
        }
    }
}

fn validate_vector(response: EmbeddingResponse, dimension: usize) -> Result<Embedding, EmbedError> {
    let entry = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::BadResponse("response contained no embeddings".to_string()))?;

    if entry.embedding.len() != dimension {
        return Err(EmbedError::BadResponse(format!(
            "expected {} dimensions, got {}",
            dimension,
            entry.embedding.len()
        )));
    }

    Ok(entry.embedding)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = (attempt as u32).min(BACKOFF_MAX_SHIFT);
    Duration::from_millis(BACKOFF_BASE_MS * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenAiEmbedder::new(
            "https://api.example.com/v1",
            "  ",
            "text-embedding-3-small",
            1536,
            Duration::from_secs(30),
            3,
        );
        assert!(matches!(result, Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_model_version_is_model_name() {
        let embedder = OpenAiEmbedder::new(
            "https://api.example.com/v1/",
            "key",
            "text-embedding-3-small",
            256,
            Duration::from_secs(30),
            3,
        )
        .unwrap();
        assert_eq!(embedder.model_version(), "text-embedding-3-small");
        assert_eq!(embedder.dimension(), 256);
        assert_eq!(embedder.endpoint, "https://api.example.com/v1/embeddings");
    }

    #[test]
    fn test_retry_backoff_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(2), Duration::from_millis(2000));
        assert_eq!(retry_backoff(10), retry_backoff(5));
    }

    #[test]
    fn test_should_retry_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_validate_vector_dimension() {
        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![0.0; 8],
            }],
        };
        assert!(validate_vector(response, 16).is_err());

        let response = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![0.0; 16],
            }],
        };
        assert!(validate_vector(response, 16).is_ok());
    }
}
