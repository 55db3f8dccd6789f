//! Corpus command handler.
//!
//! Inspection and maintenance of the indexed document set.

use clap::{Args, Subcommand};
use quarry_core::{config::AppConfig, AppResult};

/// Inspect and maintain the indexed corpus
#[derive(Args, Debug)]
pub struct CorpusCommand {
    #[command(subcommand)]
    pub action: CorpusAction,
}

#[derive(Subcommand, Debug)]
pub enum CorpusAction {
    /// List indexed documents
    List(CorpusListCommand),
    /// Show index statistics
    Stats(CorpusStatsCommand),
    /// Remove a document and its chunks from the index
    Purge(CorpusPurgeCommand),
}

/// List indexed documents
#[derive(Args, Debug)]
pub struct CorpusListCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusListCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let catalog = engine.catalog().await;

        if self.json {
            let output = serde_json::json!({
                "documents": catalog.iter().map(|doc| serde_json::json!({
                    "documentId": doc.document_id,
                    "title": doc.title,
                    "chunkCount": doc.chunk_count,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if catalog.is_empty() {
            println!("The index is empty. Use 'quarry ingest <dir>' to add documents.");
        } else {
            println!("Indexed documents:");
            for doc in &catalog {
                match &doc.title {
                    Some(title) => {
                        println!("  {} ({} chunks) - {}", doc.document_id, doc.chunk_count, title)
                    }
                    None => println!("  {} ({} chunks)", doc.document_id, doc.chunk_count),
                }
            }
        }

        Ok(())
    }
}

/// Show index statistics
#[derive(Args, Debug)]
pub struct CorpusStatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let engine = super::build_engine(config)?;
        let stats = engine.stats().await;

        if self.json {
            let output = serde_json::json!({
                "documents": stats.documents,
                "chunks": stats.chunks,
                "dimensions": stats.dimensions,
                "dbSizeBytes": stats.db_size_bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Index: {}", config.data_dir.display());
            println!("  Documents: {}", stats.documents);
            println!("  Chunks: {}", stats.chunks);
            println!("  Dimensions: {}", stats.dimensions);
            println!("  DB size: {} bytes", stats.db_size_bytes);
        }

        Ok(())
    }
}

/// Remove a document and its chunks from the index
#[derive(Args, Debug)]
pub struct CorpusPurgeCommand {
    /// Document id to remove (as shown by 'corpus list')
    pub document_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusPurgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Purging document '{}'", self.document_id);

        let engine = super::build_engine(config)?;
        let removed = engine.purge(&self.document_id).await?;

        if self.json {
            let output = serde_json::json!({
                "documentId": self.document_id,
                "chunksRemoved": removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if removed > 0 {
            println!("Removed '{}' ({} chunks)", self.document_id, removed);
        } else {
            println!("No document '{}' in the index", self.document_id);
        }

        Ok(())
    }
}

impl CorpusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            CorpusAction::List(cmd) => cmd.execute(config).await,
            CorpusAction::Stats(cmd) => cmd.execute(config).await,
            CorpusAction::Purge(cmd) => cmd.execute(config).await,
        }
    }
}
