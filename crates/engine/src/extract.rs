//! Per-chunk metadata extraction.
//!
//! Each metadata kind (title, summary, keywords, question/answer pairs)
//! is one independent LLM call. A failed call is logged, recorded, and
//! contained: the chunk keeps whatever the other calls produced and
//! ingestion carries on.

use std::sync::Arc;

use quarry_core::{AppError, AppResult};
use quarry_llm::{LlmClient, LlmRequest};
use serde_json::json;
use tracing::warn;

use crate::prompt;
use crate::types::{ChunkMetadata, ExtractOptions, QaPair};

/// Most keywords retained per chunk.
pub const MAX_KEYWORDS: usize = 15;
/// Most question/answer pairs retained per chunk.
pub const MAX_QA_PAIRS: usize = 3;
/// Only this many leading chunks of a document are titled.
pub const TITLE_CHUNKS: u32 = 5;

/// What one extraction pass produced.
#[derive(Debug)]
pub struct Extraction {
    pub metadata: ChunkMetadata,
    /// Kinds whose call failed and was contained.
    pub failed_kinds: Vec<&'static str>,
}

/// Derives chunk metadata through isolated LLM calls.
pub struct MetadataExtractor {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl MetadataExtractor {
    pub fn new(client: Arc<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    /// Runs the enabled extraction kinds against `text`.
    pub async fn extract(&self, text: &str, options: &ExtractOptions) -> Extraction {
        let mut metadata = ChunkMetadata::default();
        let mut failed_kinds = Vec::new();

        if options.title {
            match self.extract_title(text).await {
                Ok(title) => metadata.title = Some(title),
                Err(e) => {
                    warn!(kind = "title", error = %e, "Metadata extraction failed");
                    failed_kinds.push("title");
                }
            }
        }
        if options.summary {
            match self.extract_summary(text).await {
                Ok(summary) => metadata.summary = Some(summary),
                Err(e) => {
                    warn!(kind = "summary", error = %e, "Metadata extraction failed");
                    failed_kinds.push("summary");
                }
            }
        }
        if options.keywords {
            match self.extract_keywords(text).await {
                Ok(keywords) => metadata.keywords = keywords,
                Err(e) => {
                    warn!(kind = "keywords", error = %e, "Metadata extraction failed");
                    failed_kinds.push("keywords");
                }
            }
        }
        if options.qa {
            match self.extract_qa(text).await {
                Ok(qa_pairs) => metadata.qa_pairs = qa_pairs,
                Err(e) => {
                    warn!(kind = "qa", error = %e, "Metadata extraction failed");
                    failed_kinds.push("qa");
                }
            }
        }

        Extraction {
            metadata,
            failed_kinds,
        }
    }

    async fn complete(&self, prompt_text: String, max_tokens: u32) -> AppResult<String> {
        let request = LlmRequest::new(prompt_text, &self.model)
            .with_temperature(0.1)
            .with_max_tokens(max_tokens);
        let response = self.client.complete(&request).await?;
        Ok(response.content)
    }

    async fn extract_title(&self, text: &str) -> AppResult<String> {
        let rendered = prompt::render_template(prompt::TITLE_TEMPLATE, &json!({ "text": text }))?;
        let raw = self.complete(rendered, 64).await?;
        let title = raw.trim().trim_matches('"').trim();
        if title.is_empty() {
            return Err(AppError::Llm(
                "Title extraction returned empty output".to_string(),
            ));
        }
        Ok(title.to_string())
    }

    async fn extract_summary(&self, text: &str) -> AppResult<String> {
        let rendered = prompt::render_template(prompt::SUMMARY_TEMPLATE, &json!({ "text": text }))?;
        let raw = self.complete(rendered, 256).await?;
        let summary = raw.trim();
        if summary.is_empty() {
            return Err(AppError::Llm(
                "Summary extraction returned empty output".to_string(),
            ));
        }
        Ok(summary.to_string())
    }

    async fn extract_keywords(&self, text: &str) -> AppResult<Vec<String>> {
        let rendered = prompt::render_template(
            prompt::KEYWORDS_TEMPLATE,
            &json!({ "text": text, "max_keywords": MAX_KEYWORDS }),
        )?;
        let raw = self.complete(rendered, 256).await?;
        let mut keywords = parse_string_array(&raw)?;
        keywords.retain(|k| !k.trim().is_empty());
        keywords.truncate(MAX_KEYWORDS);
        Ok(keywords)
    }

    async fn extract_qa(&self, text: &str) -> AppResult<Vec<QaPair>> {
        let rendered = prompt::render_template(
            prompt::QA_TEMPLATE,
            &json!({ "text": text, "max_pairs": MAX_QA_PAIRS }),
        )?;
        let raw = self.complete(rendered, 512).await?;
        let mut pairs = parse_qa_array(&raw)?;
        pairs.retain(|p| !p.question.trim().is_empty() && !p.answer.trim().is_empty());
        pairs.truncate(MAX_QA_PAIRS);
        Ok(pairs)
    }
}

/// The JSON array inside `raw`, tolerating code fences and prose around
/// it. Models rarely return the bare array they were asked for.
pub(crate) fn json_array_slice(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn parse_string_array(raw: &str) -> AppResult<Vec<String>> {
    let slice = json_array_slice(raw)
        .ok_or_else(|| AppError::Llm("Expected a JSON array of strings".to_string()))?;
    serde_json::from_str::<Vec<String>>(slice)
        .map_err(|e| AppError::Llm(format!("Failed to parse keyword array: {}", e)))
}

fn parse_qa_array(raw: &str) -> AppResult<Vec<QaPair>> {
    let slice = json_array_slice(raw)
        .ok_or_else(|| AppError::Llm("Expected a JSON array of question/answer pairs".to_string()))?;
    serde_json::from_str::<Vec<QaPair>>(slice)
        .map_err(|e| AppError::Llm(format!("Failed to parse question/answer array: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::StubClient;

    #[test]
    fn test_parse_string_array_tolerates_fences_and_prose() {
        let raw = "Here are the keywords:\n```json\n[\"pets\", \"cabin\", \"carrier\"]\n```\n";
        assert_eq!(
            parse_string_array(raw).unwrap(),
            vec!["pets", "cabin", "carrier"]
        );
    }

    #[test]
    fn test_parse_string_array_rejects_non_array() {
        assert!(parse_string_array("no array here").is_err());
        assert!(parse_string_array("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_parse_qa_array() {
        let raw = r#"[{"question": "How many pets per carrier?", "answer": "One."}]"#;
        let pairs = parse_qa_array(raw).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "How many pets per carrier?");
        assert_eq!(pairs[0].answer, "One.");
    }

    #[tokio::test]
    async fn test_failed_kind_is_contained() {
        let client = StubClient::with_rules(vec![
            ("title", Ok("Pet Carrier Rules".to_string())),
            ("keywords", Err("model overloaded".to_string())),
        ]);
        let extractor = MetadataExtractor::new(Arc::new(client), "test-model");
        let options = ExtractOptions {
            title: true,
            summary: false,
            keywords: true,
            qa: false,
        };

        let extraction = extractor
            .extract("Carriers must fit under the seat.", &options)
            .await;
        assert_eq!(extraction.metadata.title.as_deref(), Some("Pet Carrier Rules"));
        assert!(extraction.metadata.keywords.is_empty());
        assert_eq!(extraction.failed_kinds, vec!["keywords"]);
    }

    #[tokio::test]
    async fn test_disabled_kinds_make_no_calls() {
        let client = StubClient::failing("should never be called");
        let extractor = MetadataExtractor::new(Arc::new(client), "test-model");

        let extraction = extractor.extract("text", &ExtractOptions::none()).await;
        assert!(extraction.metadata.is_empty());
        assert!(extraction.failed_kinds.is_empty());
    }
}
