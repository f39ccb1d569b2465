//! ============================================================================
//! Embedding Service - Vector embeddings for semantic recall
//! ============================================================================
//! Generates text embeddings using an OpenAI-compatible `/embeddings` API.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MemoryConfig, DEFAULT_EMBEDDING_BASE_URL, DEFAULT_EMBEDDING_MODEL};

/// Turns text into a query vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create a new embedding service using the OpenAI API
    pub fn new_openai(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            DEFAULT_EMBEDDING_BASE_URL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and model
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new_custom(
            config.embedding_api_key.clone(),
            config.embedding_base_url.clone(),
            config.embedding_model.clone(),
        )
    }

    /// Generate embeddings for multiple texts
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!(
                    "Embedding API error ({}): {}",
                    status,
                    error.error.message
                ));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {} - body: {}", e, body))?;

        if let Some(usage) = &embedding_response.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens, embedding_response.model
            );
        }

        // Sort by index and extract embeddings
        let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }

    /// Generate embedding for a single text
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_service(base_url: &str) -> EmbeddingService {
        EmbeddingService::new_custom(
            "test-key".to_string(),
            base_url.to_string(),
            "test-model".to_string(),
        )
    }

    #[test]
    fn test_service_creation() {
        let service = EmbeddingService::new_openai("test-key".to_string());
        assert_eq!(service.base_url(), "https://api.openai.com/v1");
        assert_eq!(service.model(), DEFAULT_EMBEDDING_MODEL);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let service = EmbeddingService::new_openai("test-key".to_string());
        let result = service.embed(&[]).await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embeddings_sorted_by_index() {
        let server = MockServer::start().await;

        let body = serde_json::json!({
            "data": [
                {"embedding": [0.25, 0.25], "index": 1},
                {"embedding": [0.5, 0.5], "index": 0}
            ],
            "model": "test-model",
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        });

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let service = test_service(&server.uri());
        let vectors = service
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.5, 0.5], vec![0.25, 0.25]]);
    }

    #[tokio::test]
    async fn test_embed_query_single() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.5, 0.25, 0.125], "index": 0}],
                "model": "test-model"
            })))
            .mount(&server)
            .await;

        let service = test_service(&server.uri());
        let vector = service.embed_query("hello").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.25, 0.125]);
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let service = test_service(&server.uri());
        let err = service.embed_single("hello").await.unwrap_err();
        assert!(err.to_string().contains("Incorrect API key provided"));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_data_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "model": "test-model"
            })))
            .mount(&server)
            .await;

        let service = test_service(&server.uri());
        assert!(service.embed_single("hello").await.is_err());
    }
}
