//! Retrieval-augmented query engine.
//!
//! The engine turns a directory of documents into an embedding index and
//! answers questions against it:
//!
//! - **Ingestion**: discover documents, normalize and chunk their text,
//!   derive per-chunk metadata through isolated LLM calls, embed, and
//!   atomically replace each document in the index.
//! - **Querying**: decompose the question into scoped sub-questions, run
//!   them concurrently (retrieve then answer), and synthesize the
//!   non-failed sub-answers into one final answer with provenance.
//!
//! Sub-question failures, metadata extraction failures, and degenerate
//! decompositions are contained; only configuration errors, dimension
//! mismatches, and index corruption propagate as errors.

pub mod chunker;
pub mod config;
pub mod embed;
pub mod executor;
pub mod extract;
pub mod index;
pub mod planner;
pub mod prompt;
pub mod reader;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use quarry_core::{AppError, AppResult};
use quarry_llm::LlmClient;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use chunker::{Chunk, Chunker};
pub use config::EngineConfig;
pub use embed::EmbeddingProvider;
pub use executor::{ExecutorSettings, SubQueryExecutor};
pub use extract::MetadataExtractor;
pub use index::EmbeddingIndex;
pub use planner::QueryPlanner;
pub use synthesizer::{Synthesizer, NO_INFORMATION_TEXT};
pub use types::{
    Answer, CatalogEntry, ChunkMetadata, ChunkRef, DocumentRecord, ExtractOptions, IndexEntry,
    IndexStats, IngestFailure, IngestOptions, IngestReport, QaPair, QueryOptions, QueryPlan,
    SearchHit, SubAnswer, SubQuestion,
};

struct DocumentOutcome {
    skipped: bool,
    chunks: u32,
    extraction_failures: u32,
}

/// The assembled engine: index, embedder, and LLM-backed stages.
pub struct QueryEngine {
    config: EngineConfig,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    client: Arc<dyn LlmClient>,
    extractor: MetadataExtractor,
    planner: QueryPlanner,
    synthesizer: Synthesizer,
}

impl QueryEngine {
    /// Opens the engine rooted at `data_dir`, creating the index on
    /// first use.
    ///
    /// The embedding identity pinned in the data directory wins over
    /// the one in `config`; see [`EngineConfig::load_or_init`].
    pub fn open(
        data_dir: &Path,
        config: EngineConfig,
        client: Arc<dyn LlmClient>,
    ) -> AppResult<Self> {
        let config = EngineConfig::load_or_init(data_dir, config)?;
        let embedder = embed::create_provider(
            &config.embedding_provider,
            &config.embedding_model,
            config.embedding_dimensions,
            None,
        )?;
        let index = Arc::new(EmbeddingIndex::open(
            &config::index_path(data_dir),
            config.embedding_dimensions,
        )?);

        let extractor = MetadataExtractor::new(Arc::clone(&client), &config.model);
        let planner = QueryPlanner::new(Arc::clone(&client), &config.model);
        let synthesizer = Synthesizer::new(Arc::clone(&client), &config.model);

        Ok(Self {
            config,
            index,
            embedder,
            client,
            extractor,
            planner,
            synthesizer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Ingests every supported document under `input_dir`.
    ///
    /// Documents are processed concurrently, each one atomically:
    /// readers of the index never see a document half-written. Unchanged
    /// documents (by content hash) are skipped. Per-document failures
    /// are reported, not propagated.
    pub async fn ingest(
        &self,
        input_dir: &Path,
        options: IngestOptions,
    ) -> AppResult<IngestReport> {
        options.validate()?;
        let started = Instant::now();

        let files = reader::discover_documents(input_dir)?;
        info!(count = files.len(), dir = %input_dir.display(), "Discovered documents");

        let outcomes: Vec<(String, AppResult<DocumentOutcome>)> =
            futures::stream::iter(files.into_iter().map(|path| {
                let options = options.clone();
                async move {
                    let document_id = reader::document_id(input_dir, &path);
                    let result = self.ingest_document(input_dir, &path, &options).await;
                    (document_id, result)
                }
            }))
            .buffer_unordered(options.max_parallel_documents)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (document_id, outcome) in outcomes {
            match outcome {
                Ok(outcome) if outcome.skipped => report.documents_skipped += 1,
                Ok(outcome) => {
                    report.documents_processed += 1;
                    report.chunks_created += outcome.chunks;
                    report.extraction_failures += outcome.extraction_failures;
                }
                Err(e) => {
                    warn!(document_id = %document_id, error = %e, "Failed to ingest document");
                    report.failures.push(IngestFailure {
                        document_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.duration_secs = started.elapsed().as_secs_f64();

        info!(
            processed = report.documents_processed,
            skipped = report.documents_skipped,
            chunks = report.chunks_created,
            failed = report.failures.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_document(
        &self,
        input_dir: &Path,
        path: &Path,
        options: &IngestOptions,
    ) -> AppResult<DocumentOutcome> {
        let raw = reader::read_document(input_dir, path)?;

        let content_hash = content_hash(&raw.text);
        if self.index.document_hash(&raw.id).await.as_deref() == Some(content_hash.as_str()) {
            debug!(document_id = %raw.id, "Document unchanged, skipping");
            return Ok(DocumentOutcome {
                skipped: true,
                chunks: 0,
                extraction_failures: 0,
            });
        }
        if raw.text.is_empty() {
            return Err(AppError::Other("Document has no text content".to_string()));
        }

        let chunker = Chunker::new(options.chunk_size, options.chunk_overlap)?;
        let chunks: Vec<Chunk> = chunker.chunks(&raw.text).collect();

        let mut extraction_failures = 0u32;
        let mut metadata_list = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let mut kinds = options.extract.clone();
            kinds.title = kinds.title && chunk.seq < extract::TITLE_CHUNKS;
            if kinds.any() {
                let extraction = self.extractor.extract(&chunk.text, &kinds).await;
                extraction_failures += extraction.failed_kinds.len() as u32;
                metadata_list.push(extraction.metadata);
            } else {
                metadata_list.push(ChunkMetadata::default());
            }
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = embed::embed_with_retry(self.embedder.as_ref(), &texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(AppError::EmbeddingUnavailable(format!(
                "Provider returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let title = metadata_list.iter().find_map(|m| m.title.clone());
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .zip(metadata_list)
            .map(|((chunk, embedding), metadata)| IndexEntry {
                chunk_id: Uuid::new_v4().to_string(),
                document_id: raw.id.clone(),
                seq: chunk.seq,
                start: chunk.start,
                end: chunk.end,
                overlap: chunk.overlap,
                text: chunk.text,
                embedding,
                metadata,
            })
            .collect();

        let chunk_count = entries.len() as u32;
        let record = DocumentRecord {
            id: raw.id.clone(),
            source_path: Some(raw.source_path.display().to_string()),
            format: raw.format.as_str().to_string(),
            title,
            content_hash,
            ingested_at: Utc::now(),
            chunk_count,
            byte_count: raw.byte_count,
        };
        self.index.replace_document(record, entries).await?;

        info!(document_id = %raw.id, chunks = chunk_count, "Ingested document");
        Ok(DocumentOutcome {
            skipped: false,
            chunks: chunk_count,
            extraction_failures,
        })
    }

    /// Answers a question against the index.
    ///
    /// Decomposition failures fall back to retrieving for the question
    /// as-is; they never fail the query. The answer is `unanswerable`
    /// only when every sub-question failed.
    pub async fn query(&self, question: &str, options: QueryOptions) -> AppResult<Answer> {
        options.validate()?;
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidConfiguration(
                "Question must not be empty".to_string(),
            ));
        }
        let started = Instant::now();

        let plan = if options.decompose {
            let catalog = self.index.catalog().await;
            match self.planner.plan(question, &catalog).await {
                Ok(plan) => plan,
                Err(AppError::PlanningFailure(reason)) => {
                    warn!(%reason, "Planning failed, falling back to direct retrieval");
                    QueryPlan::degenerate(question)
                }
                Err(e) => return Err(e),
            }
        } else {
            QueryPlan::degenerate(question)
        };

        info!(
            sub_questions = plan.sub_questions.len(),
            degenerate = plan.degenerate,
            "Executing query plan"
        );
        let executor = SubQueryExecutor::new(
            Arc::clone(&self.index),
            Arc::clone(&self.embedder),
            Arc::clone(&self.client),
            ExecutorSettings {
                model: self.config.model.clone(),
                top_k: options.top_k,
                min_score: self.config.min_score,
                timeout: options.sub_question_timeout,
            },
        );
        let sub_answers = executor.execute(&plan.sub_questions).await;

        let mut answer = self.synthesizer.synthesize(question, sub_answers).await;
        answer.duration_secs = started.elapsed().as_secs_f64();
        Ok(answer)
    }

    /// Removes a document from the index. Unknown ids are a no-op.
    pub async fn purge(&self, document_id: &str) -> AppResult<u32> {
        self.index.delete(document_id).await
    }

    pub async fn catalog(&self) -> Vec<CatalogEntry> {
        self.index.catalog().await
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.stats().await
    }
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
