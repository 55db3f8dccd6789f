//! Shared types for ingestion, retrieval, and query answering.

use std::time::Duration;

use chrono::{DateTime, Utc};
use quarry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Smallest accepted chunk size, in characters.
pub const MIN_CHUNK_SIZE: usize = 100;
/// Largest accepted chunk size, in characters.
pub const MAX_CHUNK_SIZE: usize = 2000;
/// Largest accepted chunk overlap, in characters.
pub const MAX_CHUNK_OVERLAP: usize = 500;
/// Smallest accepted result count for a search.
pub const MIN_TOP_K: usize = 1;
/// Largest accepted result count for a search.
pub const MAX_TOP_K: usize = 50;

/// Default number of retrieved chunks per sub-question.
pub const DEFAULT_TOP_K: usize = 10;
/// Default wall-clock budget for a single sub-question.
pub const DEFAULT_SUB_QUESTION_TIMEOUT_SECS: u64 = 60;
/// Default number of documents ingested concurrently.
pub const DEFAULT_INGEST_PARALLELISM: usize = 4;

/// A document admitted to the index.
///
/// The `id` is the document's path relative to the ingestion root, with
/// `/` separators on every platform, so re-ingesting the same tree maps
/// onto the same identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub source_path: Option<String>,
    pub format: String,
    pub title: Option<String>,
    /// SHA-256 of the normalized text, used to skip unchanged documents.
    pub content_hash: String,
    pub ingested_at: DateTime<Utc>,
    pub chunk_count: u32,
    pub byte_count: u64,
}

/// Metadata derived for a chunk. Every field is optional because each
/// extraction kind can fail independently without failing the chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qa_pairs: Vec<QaPair>,
}

impl ChunkMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.keywords.is_empty()
            && self.qa_pairs.is_empty()
    }
}

/// A question the chunk can answer, paired with the answer it supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// One indexed chunk: identity, position, text, vector, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    /// Position of the chunk within its document, starting at 0.
    pub seq: u32,
    /// Character offset of the chunk start in the normalized text.
    pub start: usize,
    /// Character offset one past the chunk end.
    pub end: usize,
    /// Characters shared with the preceding chunk (0 for the first).
    pub overlap: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A ranked search result. The embedding itself is not carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub seq: u32,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// One focused question produced by decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestion {
    /// Position in the plan; provenance and synthesis follow this order.
    pub ordinal: u32,
    pub text: String,
    /// Optional hint narrowing retrieval to matching documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A decomposition of one user question.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub sub_questions: Vec<SubQuestion>,
    /// True when the plan is the question itself, unsplit.
    pub degenerate: bool,
}

impl QueryPlan {
    /// The fallback plan: the original question as the single sub-question.
    pub fn degenerate(question: &str) -> Self {
        Self {
            sub_questions: vec![SubQuestion {
                ordinal: 0,
                text: question.to_string(),
                scope: None,
            }],
            degenerate: true,
        }
    }
}

/// A pointer from an answer back to an indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRef {
    pub document_id: String,
    pub seq: u32,
    pub score: f32,
    pub snippet: String,
}

/// The outcome of one sub-question, successful or contained-failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAnswer {
    pub question: SubQuestion,
    pub text: String,
    pub sources: Vec<ChunkRef>,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SubAnswer {
    pub fn answered(question: SubQuestion, text: String, sources: Vec<ChunkRef>) -> Self {
        Self {
            question,
            text,
            sources,
            failed: false,
            failure_reason: None,
        }
    }

    pub fn failure(question: SubQuestion, reason: impl Into<String>) -> Self {
        Self {
            question,
            text: String::new(),
            sources: Vec::new(),
            failed: true,
            failure_reason: Some(reason.into()),
        }
    }
}

/// The final answer to a user question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    /// True when no sub-question produced a usable answer.
    pub unanswerable: bool,
    /// Sub-answers in sub-question ordinal order.
    pub sub_answers: Vec<SubAnswer>,
    pub duration_secs: f64,
}

impl Answer {
    /// All provenance references, ordered by sub-question ordinal.
    pub fn sources(&self) -> Vec<&ChunkRef> {
        self.sub_answers
            .iter()
            .flat_map(|sub| sub.sources.iter())
            .collect()
    }
}

/// A catalog row describing one indexed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub document_id: String,
    pub title: Option<String>,
    pub chunk_count: u32,
}

/// Aggregate counters for the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: u32,
    pub chunks: u32,
    pub dimensions: usize,
    pub db_size_bytes: u64,
}

/// Which metadata kinds to derive during ingestion.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub title: bool,
    pub summary: bool,
    pub keywords: bool,
    pub qa: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            title: true,
            summary: true,
            keywords: true,
            qa: true,
        }
    }
}

impl ExtractOptions {
    /// Disable every extraction kind.
    pub fn none() -> Self {
        Self {
            title: false,
            summary: false,
            keywords: false,
            qa: false,
        }
    }

    pub fn any(&self) -> bool {
        self.title || self.summary || self.keywords || self.qa
    }
}

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub extract: ExtractOptions,
    pub max_parallel_documents: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 128,
            extract: ExtractOptions::default(),
            max_parallel_documents: DEFAULT_INGEST_PARALLELISM,
        }
    }
}

impl IngestOptions {
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk size must be between {} and {}, got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.chunk_overlap > MAX_CHUNK_OVERLAP {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk overlap must be at most {}, got {}",
                MAX_CHUNK_OVERLAP, self.chunk_overlap
            )));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_parallel_documents == 0 {
            return Err(AppError::InvalidConfiguration(
                "Ingestion parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one ingestion run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents_processed: u32,
    /// Documents whose content hash was unchanged since the last run.
    pub documents_skipped: u32,
    pub chunks_created: u32,
    /// Individual metadata extraction calls that failed and were contained.
    pub extraction_failures: u32,
    pub failures: Vec<IngestFailure>,
    pub duration_secs: f64,
}

/// A document that could not be ingested, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    pub document_id: String,
    pub reason: String,
}

/// Knobs for one query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    /// When false, skip decomposition and retrieve for the question as-is.
    pub decompose: bool,
    pub sub_question_timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            decompose: true,
            sub_question_timeout: Duration::from_secs(DEFAULT_SUB_QUESTION_TIMEOUT_SECS),
        }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.top_k) {
            return Err(AppError::InvalidConfiguration(format!(
                "Result count must be between {} and {}, got {}",
                MIN_TOP_K, MAX_TOP_K, self.top_k
            )));
        }
        Ok(())
    }
}
