//! Embedding provider trait and factory.

use std::sync::Arc;

use quarry_core::{AppError, AppResult};

use super::providers::hash::HashProvider;
use super::providers::ollama::OllamaEmbedder;

/// A source of fixed-dimension embedding vectors.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name, e.g. "hash" or "ollama".
    fn provider_name(&self) -> &str;

    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Dimension of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Embeds multiple texts in one call.
    ///
    /// Transient backend failures are reported as
    /// [`AppError::EmbeddingUnavailable`] so callers can retry.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let texts = [text.to_string()];
        let mut results = self.embed_batch(&texts).await?;
        results.pop().ok_or_else(|| {
            AppError::EmbeddingUnavailable("Provider returned no embedding".to_string())
        })
    }
}

/// Creates an embedding provider by name.
///
/// `endpoint` only applies to network providers; the hash provider
/// ignores it.
pub fn create_provider(
    provider: &str,
    model: &str,
    dimensions: usize,
    endpoint: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if dimensions == 0 {
        return Err(AppError::InvalidConfiguration(
            "Embedding dimensions must be positive".to_string(),
        ));
    }
    match provider {
        "hash" => Ok(Arc::new(HashProvider::new(dimensions))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(model, dimensions, endpoint))),
        _ => Err(AppError::InvalidConfiguration(format!(
            "Unknown embedding provider: '{}'. Supported providers: hash, ollama",
            provider
        ))),
    }
}
