//! Ollama embedding provider.
//!
//! Talks to a local Ollama instance, one `/api/embeddings` call per
//! text since Ollama has no batch endpoint. Transport and server
//! failures are reported as [`AppError::EmbeddingUnavailable`] so the
//! shared retry path can back off and try again; a model producing the
//! wrong vector width is a configuration problem and is not retried.

use std::time::Duration;

use quarry_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embed::provider::EmbeddingProvider;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Embedding provider backed by a running Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaEmbedder {
    /// Creates an embedder for `model`. The endpoint falls back to the
    /// `OLLAMA_URL` environment variable, then to localhost.
    pub fn new(model: &str, dimensions: usize, endpoint: Option<&str>) -> Self {
        let base_url = endpoint
            .map(|e| e.to_string())
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::EmbeddingUnavailable(format!(
                    "Failed to reach Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(AppError::EmbeddingUnavailable(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingUnavailable(format!("Failed to parse Ollama response: {}", e))
        })?;

        if body.embedding.len() != self.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions,
                actual: body.embedding.len(),
            });
        }

        Ok(body.embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = texts.len(), model = %self.model, "Embedding batch via Ollama");

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                embeddings.push(vec![0.0; self.dimensions]);
                continue;
            }
            embeddings.push(self.embed_single(text).await?);
        }
        Ok(embeddings)
    }
}
