//! Quarry CLI
//!
//! Main entry point for the quarry command-line tool.
//! Provides retrieval-augmented question answering over local documents.

mod commands;

use clap::{Parser, Subcommand};
use commands::{CorpusCommand, IngestCommand, QueryCommand};
use quarry_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// Quarry - retrieval-augmented question answering over local documents
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Index local documents and answer questions against them", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the data directory holding the index (default: .quarry)
    #[arg(short, long, global = true, env = "QUARRY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "QUARRY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai)
    #[arg(short, long, global = true, env = "QUARRY_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "QUARRY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest documents from a directory into the index
    Ingest(IngestCommand),

    /// Ask a question against the indexed documents
    Query(QueryCommand),

    /// Inspect and maintain the indexed corpus
    Corpus(CorpusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.data_dir,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Quarry starting");
    tracing::debug!("Data dir: {:?}", config.data_dir);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;
    config.ensure_data_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Query(_) => "query",
        Commands::Corpus(_) => "corpus",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Query(cmd) => cmd.execute(&config).await,
        Commands::Corpus(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
