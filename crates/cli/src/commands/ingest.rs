//! Ingest command handler.
//!
//! Walks a directory, chunks and embeds every supported document, and
//! prints the resulting report.

use clap::Args;
use quarry_core::{config::AppConfig, AppResult};
use quarry_engine::{ExtractOptions, IngestOptions};
use std::path::PathBuf;

/// Ingest documents from a directory into the index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Directory to ingest documents from
    pub path: PathBuf,

    /// Chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Overlap between consecutive chunks in characters
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Skip LLM metadata extraction (titles, summaries, keywords, Q&A)
    #[arg(long)]
    pub no_extract: bool,

    /// Number of documents processed in parallel
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for {:?}", self.path);

        let engine = super::build_engine(config)?;

        let mut options = IngestOptions {
            chunk_size: self.chunk_size.unwrap_or(config.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(config.chunk_overlap),
            ..IngestOptions::default()
        };
        if self.no_extract {
            options.extract = ExtractOptions::none();
        }
        if let Some(parallel) = self.parallel {
            options.max_parallel_documents = parallel;
        }

        let report = engine.ingest(&self.path, options).await?;

        if self.json {
            let output = serde_json::json!({
                "documentsProcessed": report.documents_processed,
                "documentsSkipped": report.documents_skipped,
                "chunksCreated": report.chunks_created,
                "extractionFailures": report.extraction_failures,
                "failures": report.failures.iter().map(|f| serde_json::json!({
                    "documentId": f.document_id,
                    "reason": f.reason,
                })).collect::<Vec<_>>(),
                "durationSecs": report.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Ingested {} documents ({} chunks) in {:.2}s",
                report.documents_processed, report.chunks_created, report.duration_secs
            );
            if report.documents_skipped > 0 {
                println!("  Skipped {} unchanged documents", report.documents_skipped);
            }
            if report.extraction_failures > 0 {
                println!(
                    "  {} metadata extraction calls failed (chunks indexed without that metadata)",
                    report.extraction_failures
                );
            }
            for failure in &report.failures {
                println!("  Failed: {} ({})", failure.document_id, failure.reason);
            }
        }

        Ok(())
    }
}
