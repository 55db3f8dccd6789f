//! Configuration management for the Quarry CLI.
//!
//! Configuration is resolved from three layers, lowest precedence first:
//! - the YAML config file (`<data_dir>/config.yaml`)
//! - environment variables (`QUARRY_*`, `RUST_LOG`, `NO_COLOR`)
//! - command-line flags
//!
//! All engine state (index database, per-index config) lives under `data_dir`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Default directory holding the index and config file.
pub const DEFAULT_DATA_DIR: &str = ".quarry";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the index database and config file
    pub data_dir: PathBuf,

    /// Optional explicit config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider ("ollama" or "openai")
    pub provider: String,

    /// Model identifier for completion calls
    pub model: String,

    /// Provider endpoint override (e.g. an OpenAI-compatible base URL)
    pub endpoint: Option<String>,

    /// API key for providers that need one
    pub api_key: Option<String>,

    /// Environment variable to read the API key from
    pub api_key_env: Option<String>,

    /// Embedding provider ("hash" or "ollama")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimensions, pinned per index at creation
    pub embedding_dimensions: usize,

    /// Default chunk size in characters
    pub chunk_size: usize,

    /// Default overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Default number of chunks retrieved per sub-question
    pub top_k: usize,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (implies debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Config file structure (`config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    embedding: Option<EmbeddingSection>,
    ingest: Option<IngestSection>,
    retrieval: Option<RetrievalSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EmbeddingSection {
    provider: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IngestSection {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RetrievalSection {
    top_k: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            api_key_env: None,
            embedding_provider: "hash".to_string(),
            embedding_model: "trigram-v1".to_string(),
            embedding_dimensions: 384,
            chunk_size: 512,
            chunk_overlap: 128,
            top_k: 10,
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment.
    ///
    /// Environment variables:
    /// - `QUARRY_DATA_DIR`: override the data directory
    /// - `QUARRY_CONFIG`: explicit config file path
    /// - `QUARRY_PROVIDER` / `QUARRY_MODEL` / `QUARRY_ENDPOINT` / `QUARRY_API_KEY`
    /// - `QUARRY_EMBEDDING_PROVIDER` / `QUARRY_EMBEDDING_MODEL`
    /// - `RUST_LOG`: log level
    /// - `NO_COLOR`: disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(data_dir) = std::env::var("QUARRY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(config_file) = std::env::var("QUARRY_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.data_dir.join("config.yaml"),
        };

        if config_path.exists() {
            config.merge_yaml(&config_path)?;
        }

        // Environment variables override the YAML file
        if let Ok(provider) = std::env::var("QUARRY_PROVIDER") {
            config.provider = provider;
        }
        if let Ok(model) = std::env::var("QUARRY_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("QUARRY_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }
        if let Ok(key) = std::env::var("QUARRY_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(provider) = std::env::var("QUARRY_EMBEDDING_PROVIDER") {
            config.embedding_provider = provider;
        }
        if let Ok(model) = std::env::var("QUARRY_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<()> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::InvalidConfiguration(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        self.apply_file(file);
        Ok(())
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                self.provider = provider;
            }
            if let Some(model) = llm.model {
                self.model = model;
            }
            if llm.endpoint.is_some() {
                self.endpoint = llm.endpoint;
            }
            if llm.api_key_env.is_some() {
                self.api_key_env = llm.api_key_env;
            }
        }

        if let Some(embedding) = file.embedding {
            if let Some(provider) = embedding.provider {
                self.embedding_provider = provider;
            }
            if let Some(model) = embedding.model {
                self.embedding_model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                self.embedding_dimensions = dimensions;
            }
        }

        if let Some(ingest) = file.ingest {
            if let Some(chunk_size) = ingest.chunk_size {
                self.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = ingest.chunk_overlap {
                self.chunk_overlap = chunk_overlap;
            }
        }

        if let Some(retrieval) = file.retrieval {
            if let Some(top_k) = retrieval.top_k {
                self.top_k = top_k;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
        }
    }

    /// Apply CLI overrides, which take precedence over file and environment.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> AppResult<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                AppError::InvalidConfiguration(format!(
                    "Failed to create data directory {:?}: {}",
                    self.data_dir, e
                ))
            })?;
        }
        Ok(())
    }

    /// Resolve the API key for the active provider.
    ///
    /// Precedence: explicit `api_key`, then the env var named by
    /// `api_key_env`, then `OPENAI_API_KEY` for the openai provider.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        if let Some(ref var) = self.api_key_env {
            if let Ok(key) = std::env::var(var) {
                return Some(key);
            }
        }

        if self.provider == "openai" {
            return std::env::var("OPENAI_API_KEY").ok();
        }

        None
    }

    /// Validate provider names and basic sanity of the configuration.
    ///
    /// Per-request parameter ranges (chunk sizes, top-k bounds) are
    /// validated where the request is built, in the engine's option types.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "openai"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::InvalidConfiguration(format!(
                "Unknown LLM provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        let known_embedding = ["hash", "ollama"];
        if !known_embedding.contains(&self.embedding_provider.as_str()) {
            return Err(AppError::InvalidConfiguration(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding_provider,
                known_embedding.join(", ")
            )));
        }

        if self.embedding_dimensions == 0 {
            return Err(AppError::InvalidConfiguration(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.top_k == 0 {
            return Err(AppError::InvalidConfiguration(
                "top_k must be at least 1".to_string(),
            ));
        }

        if self.provider == "openai" && self.resolve_api_key().is_none() {
            return Err(AppError::InvalidConfiguration(
                "The openai provider requires an API key (QUARRY_API_KEY, api_key_env, or OPENAI_API_KEY)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
