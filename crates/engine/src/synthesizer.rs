//! Answer synthesis.
//!
//! Merges the non-failed sub-answers into one final answer. The
//! `unanswerable` flag is set only when every sub-question failed; any
//! other degradation (synthesis call failure, empty synthesis output)
//! falls back to stitching the successful sub-answers together in
//! ordinal order rather than losing them.

use std::sync::Arc;

use quarry_core::AppResult;
use quarry_llm::{LlmClient, LlmRequest};
use serde_json::json;
use tracing::{debug, warn};

use crate::prompt;
use crate::types::{Answer, SubAnswer};

/// The answer text when nothing usable was retrieved.
pub const NO_INFORMATION_TEXT: &str =
    "I could not find information about this in the indexed documents.";

pub struct Synthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl Synthesizer {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Builds the final answer from sub-answers.
    ///
    /// The returned answer carries every sub-answer, failed ones
    /// included, sorted by ordinal. `duration_secs` is left at zero for
    /// the caller to fill in.
    pub async fn synthesize(&self, question: &str, mut sub_answers: Vec<SubAnswer>) -> Answer {
        sub_answers.sort_by_key(|sub| sub.question.ordinal);

        let successful: Vec<&SubAnswer> =
            sub_answers.iter().filter(|sub| !sub.failed).collect();
        if successful.is_empty() {
            warn!(
                sub_questions = sub_answers.len(),
                "Every sub-question failed, question is unanswerable"
            );
            return Answer {
                question: question.to_string(),
                text: NO_INFORMATION_TEXT.to_string(),
                unanswerable: true,
                sub_answers,
                duration_secs: 0.0,
            };
        }

        // A single-question plan has nothing to merge; promote its answer
        // without a second model round trip.
        if sub_answers.len() == 1 {
            debug!("Single sub-answer, promoting directly");
            let text = sub_answers[0].text.clone();
            return Answer {
                question: question.to_string(),
                text,
                unanswerable: false,
                sub_answers,
                duration_secs: 0.0,
            };
        }

        let text = match self.merge(question, &successful).await {
            Ok(merged) if !is_empty_output(&merged) => merged,
            Ok(_) => {
                warn!("Synthesis returned empty output, stitching sub-answers");
                stitch(&successful)
            }
            Err(e) => {
                warn!(error = %e, "Synthesis call failed, stitching sub-answers");
                stitch(&successful)
            }
        };

        Answer {
            question: question.to_string(),
            text,
            unanswerable: false,
            sub_answers,
            duration_secs: 0.0,
        }
    }

    async fn merge(&self, question: &str, successful: &[&SubAnswer]) -> AppResult<String> {
        let parts: Vec<serde_json::Value> = successful
            .iter()
            .map(|sub| {
                json!({
                    "ordinal": sub.question.ordinal,
                    "question": sub.question.text,
                    "text": sub.text,
                })
            })
            .collect();
        let rendered = prompt::render_template(
            prompt::SYNTHESIZE_TEMPLATE,
            &json!({ "question": question, "sub_answers": parts }),
        )?;
        let request = LlmRequest::new(rendered, &self.model)
            .with_temperature(0.3)
            .with_system(prompt::ANSWER_SYSTEM);
        let response = self.client.complete(&request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Empty or the literal "Empty Response" some models emit when they
/// have nothing to say.
fn is_empty_output(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("empty response")
}

/// Joins successful sub-answer texts in ordinal order.
fn stitch(successful: &[&SubAnswer]) -> String {
    successful
        .iter()
        .map(|sub| sub.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
