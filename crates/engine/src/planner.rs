//! LLM-driven query decomposition.
//!
//! The planner asks the model to split a question into scoped
//! sub-questions, given the catalog of indexed documents. Two failure
//! shapes are kept apart: a parseable plan with zero sub-questions falls
//! back to the degenerate plan (the question itself, unscoped), while
//! output that does not parse at all is a [`AppError::PlanningFailure`]
//! for the caller to decide on.

use std::sync::Arc;

use quarry_core::{AppError, AppResult};
use quarry_llm::{LlmClient, LlmRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::extract::json_array_slice;
use crate::prompt;
use crate::types::{CatalogEntry, QueryPlan, SubQuestion};

/// Longest slice of malformed output quoted back in an error.
const MALFORMED_PREVIEW_CHARS: usize = 200;

/// One element of the model's decomposition output.
#[derive(Debug, Deserialize)]
struct PlannedItem {
    question: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug)]
enum DecompositionParse {
    Parsed(Vec<PlannedItem>),
    Malformed,
}

/// Plans queries by decomposing them against the document catalog.
pub struct QueryPlanner {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl QueryPlanner {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Produces a plan for `question`.
    ///
    /// Returns the degenerate plan when the model decides the question
    /// needs no splitting (zero usable sub-questions). Malformed model
    /// output is an error; the engine treats it as a fallback signal.
    pub async fn plan(
        &self,
        question: &str,
        catalog: &[CatalogEntry],
    ) -> AppResult<QueryPlan> {
        let rendered = prompt::render_template(
            prompt::DECOMPOSE_TEMPLATE,
            &json!({ "question": question, "documents": catalog }),
        )?;
        let request = LlmRequest::new(rendered, &self.model)
            .with_temperature(0.1)
            .with_system(prompt::PLAN_SYSTEM);

        let response = self
            .client
            .complete(&request)
            .await
            .map_err(|e| AppError::PlanningFailure(format!("Decomposition call failed: {}", e)))?;

        match parse_decomposition(&response.content) {
            DecompositionParse::Parsed(items) if items.is_empty() => {
                debug!("Decomposition produced no sub-questions, using degenerate plan");
                Ok(QueryPlan::degenerate(question))
            }
            DecompositionParse::Parsed(items) => {
                let sub_questions: Vec<SubQuestion> = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| SubQuestion {
                        ordinal: i as u32,
                        text: item.question.trim().to_string(),
                        scope: normalize_scope(item.scope),
                    })
                    .collect();
                debug!(count = sub_questions.len(), "Planned sub-questions");
                Ok(QueryPlan {
                    sub_questions,
                    degenerate: false,
                })
            }
            DecompositionParse::Malformed => {
                warn!("Decomposition output did not parse");
                Err(AppError::PlanningFailure(format!(
                    "Decomposition output did not parse: {}",
                    preview(&response.content)
                )))
            }
        }
    }
}

/// Parses the model's decomposition output leniently: code fences and
/// surrounding prose are tolerated, blank questions are dropped.
fn parse_decomposition(raw: &str) -> DecompositionParse {
    let Some(slice) = json_array_slice(raw) else {
        return DecompositionParse::Malformed;
    };
    match serde_json::from_str::<Vec<PlannedItem>>(slice) {
        Ok(mut items) => {
            items.retain(|item| !item.question.trim().is_empty());
            DecompositionParse::Parsed(items)
        }
        Err(_) => DecompositionParse::Malformed,
    }
}

/// Collapses blank or "everything" scopes to `None` so a sloppy model
/// cannot accidentally scope a sub-question to nothing.
fn normalize_scope(scope: Option<String>) -> Option<String> {
    let scope = scope?;
    let trimmed = scope.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("all")
        || trimmed.eq_ignore_ascii_case("none")
    {
        return None;
    }
    Some(trimmed.to_string())
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MALFORMED_PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(MALFORMED_PREVIEW_CHARS).collect();
    format!("{}...", head)
}
