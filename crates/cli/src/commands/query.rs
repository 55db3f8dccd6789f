//! Query command handler.
//!
//! Runs a question through decomposition, retrieval, and synthesis, and
//! prints the answer with its sources.

use clap::Args;
use quarry_core::{config::AppConfig, AppResult};
use quarry_engine::QueryOptions;
use std::time::Duration;

/// Ask a question against the indexed documents
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// The question to answer
    pub question: String,

    /// Number of chunks to retrieve per sub-question
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Answer the question as-is, without decomposing it
    #[arg(long)]
    pub no_decompose: bool,

    /// Per-sub-question timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing query command");

        let engine = super::build_engine(config)?;

        let mut options = QueryOptions {
            top_k: self.top_k.unwrap_or(config.top_k),
            decompose: !self.no_decompose,
            ..QueryOptions::default()
        };
        if let Some(timeout) = self.timeout {
            options.sub_question_timeout = Duration::from_secs(timeout);
        }

        let answer = engine.query(&self.question, options).await?;

        tracing::debug!(
            "Answered with {} sub-questions, unanswerable={}, in {:.2}s",
            answer.sub_answers.len(),
            answer.unanswerable,
            answer.duration_secs
        );

        if self.json {
            let output = serde_json::json!({
                "question": answer.question,
                "answer": answer.text,
                "unanswerable": answer.unanswerable,
                "durationSecs": answer.duration_secs,
                "subAnswers": answer.sub_answers.iter().map(|sub| serde_json::json!({
                    "ordinal": sub.question.ordinal,
                    "question": sub.question.text,
                    "scope": sub.question.scope,
                    "answer": sub.text,
                    "failed": sub.failed,
                    "failureReason": sub.failure_reason,
                    "sources": sub.sources.iter().map(|source| serde_json::json!({
                        "documentId": source.document_id,
                        "seq": source.seq,
                        "score": source.score,
                        "snippet": source.snippet,
                    })).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Answer:");
            println!("{}", answer.text);
            println!();

            let sources = answer.sources();
            if sources.is_empty() {
                println!("Sources: (no sources available)");
            } else {
                println!("Sources:");
                for source in sources {
                    println!(
                        "- {}#{} (score {:.3})",
                        source.document_id, source.seq, source.score
                    );
                }
            }

            for sub in &answer.sub_answers {
                if sub.failed {
                    println!(
                        "Note: sub-question {:?} failed: {}",
                        sub.question.text,
                        sub.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }

        Ok(())
    }
}
