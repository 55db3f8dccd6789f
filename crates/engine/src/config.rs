//! Engine configuration persisted beside the index.
//!
//! The embedding identity (provider, model, dimensions) is pinned when
//! the index is first created; later opens keep the pinned values and
//! ignore requested changes, because vectors from a different embedder
//! would be silently incomparable. Runtime knobs (LLM model, chunk
//! sizes, retrieval depth) follow whatever the caller asks for.

use std::path::{Path, PathBuf};

use quarry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{
    DEFAULT_INGEST_PARALLELISM, DEFAULT_SUB_QUESTION_TIMEOUT_SECS, DEFAULT_TOP_K,
    MAX_CHUNK_OVERLAP, MAX_CHUNK_SIZE, MAX_TOP_K, MIN_CHUNK_SIZE, MIN_TOP_K,
};

/// Index database file inside the data directory.
pub const INDEX_DB_FILE: &str = "index.sqlite3";
/// Pinned engine configuration inside the data directory.
pub const INDEX_META_FILE: &str = "index.yaml";

fn default_embedding_provider() -> String {
    "hash".to_string()
}

fn default_embedding_model() -> String {
    "trigram-v1".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    128
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_min_score() -> f32 {
    0.0
}

fn default_sub_question_timeout_secs() -> u64 {
    DEFAULT_SUB_QUESTION_TIMEOUT_SECS
}

fn default_max_parallel_documents() -> usize {
    DEFAULT_INGEST_PARALLELISM
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    /// LLM model used for planning, answering, synthesis, extraction.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Retrieval hits below this score are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_sub_question_timeout_secs")]
    pub sub_question_timeout_secs: u64,
    #[serde(default = "default_max_parallel_documents")]
    pub max_parallel_documents: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            model: default_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            min_score: default_min_score(),
            sub_question_timeout_secs: default_sub_question_timeout_secs(),
            max_parallel_documents: default_max_parallel_documents(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.embedding_dimensions == 0 {
            return Err(AppError::InvalidConfiguration(
                "Embedding dimensions must be positive".to_string(),
            ));
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk size must be between {} and {}, got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.chunk_overlap > MAX_CHUNK_OVERLAP || self.chunk_overlap >= self.chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk overlap must be at most {} and smaller than the chunk size, got {}",
                MAX_CHUNK_OVERLAP, self.chunk_overlap
            )));
        }
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.top_k) {
            return Err(AppError::InvalidConfiguration(format!(
                "Result count must be between {} and {}, got {}",
                MIN_TOP_K, MAX_TOP_K, self.top_k
            )));
        }
        if self.max_parallel_documents == 0 {
            return Err(AppError::InvalidConfiguration(
                "Ingestion parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Loads the pinned configuration for `data_dir`, creating it from
    /// `desired` on first use.
    ///
    /// On later opens, the stored embedding identity wins over the
    /// requested one; everything else follows `desired`.
    pub fn load_or_init(data_dir: &Path, desired: EngineConfig) -> AppResult<EngineConfig> {
        let path = meta_path(data_dir);
        if !path.exists() {
            std::fs::create_dir_all(data_dir)?;
            desired.validate()?;
            desired.save(&path)?;
            return Ok(desired);
        }

        let stored = Self::load(&path)?;
        let mut merged = desired;
        if merged.embedding_provider != stored.embedding_provider
            || merged.embedding_model != stored.embedding_model
            || merged.embedding_dimensions != stored.embedding_dimensions
        {
            warn!(
                pinned_provider = %stored.embedding_provider,
                pinned_model = %stored.embedding_model,
                pinned_dimensions = stored.embedding_dimensions,
                "Index pins its embedding configuration; ignoring requested change"
            );
        }
        merged.embedding_provider = stored.embedding_provider;
        merged.embedding_model = stored.embedding_model;
        merged.embedding_dimensions = stored.embedding_dimensions;
        merged.validate()?;
        Ok(merged)
    }
}

pub fn index_path(data_dir: &Path) -> PathBuf {
    data_dir.join(INDEX_DB_FILE)
}

pub fn meta_path(data_dir: &Path) -> PathBuf {
    data_dir.join(INDEX_META_FILE)
}
