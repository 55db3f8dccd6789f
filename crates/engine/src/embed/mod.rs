//! Embedding generation.
//!
//! Providers sit behind [`EmbeddingProvider`]; the engine talks to them
//! through [`embed_with_retry`], which retries transient failures so a
//! briefly unavailable backend does not fail a whole ingestion run.

pub mod provider;
pub mod providers;

use std::time::Duration;

use quarry_core::{AppError, AppResult};
use tracing::warn;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::hash::HashProvider;
pub use providers::ollama::OllamaEmbedder;

/// How many retries a failed embedding call gets after the first attempt.
pub const MAX_EMBED_RETRIES: u32 = 3;
/// Backoff before the first retry; doubles on each subsequent one.
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Embeds a batch, retrying transient failures with exponential backoff.
///
/// Only [`AppError::EmbeddingUnavailable`] is retried. Configuration and
/// dimension errors surface immediately.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> AppResult<Vec<Vec<f32>>> {
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
    let mut retries = 0;

    loop {
        match provider.embed_batch(texts).await {
            Ok(embeddings) => return Ok(embeddings),
            Err(AppError::EmbeddingUnavailable(reason)) if retries < MAX_EMBED_RETRIES => {
                retries += 1;
                warn!(
                    retry = retries,
                    max = MAX_EMBED_RETRIES,
                    %reason,
                    "Embedding call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Embeds a single text through the same retry path.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> AppResult<Vec<f32>> {
    let texts = [text.to_string()];
    let mut embeddings = embed_with_retry(provider, &texts).await?;
    embeddings
        .pop()
        .ok_or_else(|| AppError::EmbeddingUnavailable("Provider returned no embedding".to_string()))
}
