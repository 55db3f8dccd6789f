//! Command handlers for the Quarry CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod corpus;
pub mod ingest;
pub mod query;

// Re-export command types for convenience
pub use corpus::CorpusCommand;
pub use ingest::IngestCommand;
pub use query::QueryCommand;

use quarry_core::{config::AppConfig, AppResult};
use quarry_engine::{EngineConfig, QueryEngine};
use quarry_llm::create_client;

/// Build a [`QueryEngine`] from the resolved application config.
pub(crate) fn build_engine(config: &AppConfig) -> AppResult<QueryEngine> {
    let api_key = config.resolve_api_key();
    let client = create_client(
        &config.provider,
        config.endpoint.as_deref(),
        api_key.as_deref(),
    )?;

    let engine_config = EngineConfig {
        embedding_provider: config.embedding_provider.clone(),
        embedding_model: config.embedding_model.clone(),
        embedding_dimensions: config.embedding_dimensions,
        model: config.model.clone(),
        chunk_size: config.chunk_size,
        chunk_overlap: config.chunk_overlap,
        top_k: config.top_k,
        ..EngineConfig::default()
    };

    QueryEngine::open(&config.data_dir, engine_config, client)
}
