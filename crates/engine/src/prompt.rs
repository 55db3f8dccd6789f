//! Prompt templates for the engine's LLM calls.
//!
//! Templates are Handlebars with escaping disabled, rendered against
//! plain serializable data. Every call site that expects structured
//! output asks for JSON only, and the callers parse leniently.

use handlebars::Handlebars;
use quarry_core::{AppError, AppResult};
use serde::Serialize;

/// System line for retrieval-grounded answering calls.
pub const ANSWER_SYSTEM: &str =
    "You answer questions strictly from the provided material. Do not use outside knowledge. \
     If the material does not contain the answer, say so plainly.";

/// System line for decomposition calls.
pub const PLAN_SYSTEM: &str =
    "You split questions into focused sub-questions for a document search system. \
     You respond with JSON only, no prose.";

/// Splits a user question into scoped sub-questions.
pub const DECOMPOSE_TEMPLATE: &str = "\
Split the question below into the smallest set of independently answerable sub-questions \
against the available documents.

Available documents:
{{#each documents}}
- {{this.document_id}}{{#if this.title}} ({{this.title}}){{/if}}
{{/each}}

Question: {{question}}

Respond with a JSON array only. Each element must be an object:
{\"question\": \"<sub-question>\", \"scope\": \"<document name to search, or null to search everything>\"}

Use one element per distinct fact the question needs. If the question is already focused, \
return a single element.";

/// Answers one sub-question from retrieved chunks.
pub const SUB_ANSWER_TEMPLATE: &str = "\
Answer the question using only the material below. First identify the most relevant \
passages, then answer concisely.

Material:
{{#each chunks}}
[{{this.label}}]
{{this.text}}

{{/each}}
Question: {{question}}";

/// Merges sub-answers into one final answer.
pub const SYNTHESIZE_TEMPLATE: &str = "\
Combine the partial answers below into one coherent answer to the original question. \
Use only facts stated in the partial answers, and keep the topics in the order given.

Original question: {{question}}

{{#each sub_answers}}
Sub-question {{this.ordinal}}: {{this.question}}
Partial answer: {{this.text}}

{{/each}}";

/// Titles a passage of text.
pub const TITLE_TEMPLATE: &str = "\
Give a short descriptive title (at most twelve words) for the text below. \
Respond with the title only, no quotes.

Text:
{{text}}";

/// Summarizes a passage of text.
pub const SUMMARY_TEMPLATE: &str = "\
Summarize the text below in two to three sentences. Respond with the summary only.

Text:
{{text}}";

/// Extracts keywords from a passage of text.
pub const KEYWORDS_TEMPLATE: &str = "\
Extract up to {{max_keywords}} keywords or key phrases from the text below. \
Respond with a JSON array of strings only.

Text:
{{text}}";

/// Extracts question/answer pairs from a passage of text.
pub const QA_TEMPLATE: &str = "\
Write up to {{max_pairs}} question and answer pairs that the text below can answer. \
Respond with a JSON array only, each element an object:
{\"question\": \"<question>\", \"answer\": \"<answer from the text>\"}

Text:
{{text}}";

/// Renders a template with escaping disabled.
pub fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Other(format!("Failed to register template: {}", e)))?;
    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Other(format!("Failed to render template: {}", e)))
}
