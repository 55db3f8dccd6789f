//! Parallel sub-question execution.
//!
//! Every sub-question in a plan runs concurrently: embed the question,
//! search the index (scoped if the plan says so), and answer from the
//! retrieved chunks. Failures are contained per sub-question. Whatever
//! happens, the executor returns exactly one sub-answer per
//! sub-question, in plan order.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use quarry_core::{AppError, AppResult};
use quarry_llm::{LlmClient, LlmRequest};
use serde_json::json;
use tracing::{debug, warn};

use crate::embed::{self, EmbeddingProvider};
use crate::index::EmbeddingIndex;
use crate::prompt;
use crate::types::{ChunkRef, SearchHit, SubAnswer, SubQuestion};

/// Longest provenance snippet carried on a [`ChunkRef`].
const MAX_SNIPPET_CHARS: usize = 150;

/// Tuning for one execution run.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub model: String,
    pub top_k: usize,
    /// Hits below this score are discarded as irrelevant.
    pub min_score: f32,
    /// Wall-clock budget per sub-question.
    pub timeout: Duration,
}

pub struct SubQueryExecutor {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    client: Arc<dyn LlmClient>,
    settings: ExecutorSettings,
}

impl SubQueryExecutor {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        client: Arc<dyn LlmClient>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            client,
            settings,
        }
    }

    /// Runs all sub-questions concurrently.
    ///
    /// The result has exactly one element per input, in the same order;
    /// a sub-question that fails or times out yields a failed
    /// [`SubAnswer`] rather than an error.
    pub async fn execute(&self, sub_questions: &[SubQuestion]) -> Vec<SubAnswer> {
        join_all(
            sub_questions
                .iter()
                .map(|sub_question| self.execute_one(sub_question.clone())),
        )
        .await
    }

    async fn execute_one(&self, sub_question: SubQuestion) -> SubAnswer {
        let outcome = tokio::time::timeout(
            self.settings.timeout,
            self.retrieve_and_answer(&sub_question),
        )
        .await;

        match outcome {
            Ok(Ok((text, sources))) => {
                debug!(
                    ordinal = sub_question.ordinal,
                    sources = sources.len(),
                    "Sub-question answered"
                );
                SubAnswer::answered(sub_question, text, sources)
            }
            Ok(Err(e)) => {
                warn!(
                    ordinal = sub_question.ordinal,
                    error = %e,
                    "Sub-question failed"
                );
                SubAnswer::failure(sub_question, e.to_string())
            }
            Err(_) => {
                warn!(ordinal = sub_question.ordinal, "Sub-question timed out");
                let reason = format!(
                    "Timed out after {}s",
                    self.settings.timeout.as_secs_f64()
                );
                SubAnswer::failure(sub_question, reason)
            }
        }
    }

    async fn retrieve_and_answer(
        &self,
        sub_question: &SubQuestion,
    ) -> AppResult<(String, Vec<ChunkRef>)> {
        let embedding = embed::embed_one(self.embedder.as_ref(), &sub_question.text).await?;
        let hits = self
            .index
            .search(
                &embedding,
                self.settings.top_k,
                sub_question.scope.as_deref(),
            )
            .await?;

        let relevant: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.settings.min_score)
            .collect();
        if relevant.is_empty() {
            return Err(AppError::Other("No relevant content found".to_string()));
        }

        let chunks: Vec<serde_json::Value> = relevant
            .iter()
            .map(|hit| {
                json!({
                    "label": format!("{}#{}", hit.document_id, hit.seq),
                    "text": hit.text,
                })
            })
            .collect();
        let rendered = prompt::render_template(
            prompt::SUB_ANSWER_TEMPLATE,
            &json!({ "question": sub_question.text, "chunks": chunks }),
        )?;
        let request = LlmRequest::new(rendered, &self.settings.model)
            .with_temperature(0.2)
            .with_system(prompt::ANSWER_SYSTEM);
        let response = self.client.complete(&request).await?;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(AppError::Llm(
                "Answering call returned empty output".to_string(),
            ));
        }

        let sources = relevant
            .iter()
            .map(|hit| ChunkRef {
                document_id: hit.document_id.clone(),
                seq: hit.seq,
                score: hit.score,
                snippet: snippet(&hit.text),
            })
            .collect();
        Ok((text.to_string(), sources))
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
    format!("{}...", head)
}
