//! Shared fixtures: a scriptable LLM stub and a small airline-policy corpus.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quarry_core::{AppError, AppResult};
use quarry_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

use crate::{EngineConfig, QueryEngine};

/// Scriptable in-memory [`LlmClient`].
///
/// Responses are selected by substring match on the rendered prompt, so
/// one stub can drive decomposition, answering, and synthesis calls in a
/// single pipeline run.
#[derive(Debug)]
pub struct StubClient {
    rules: Vec<(String, Result<String, String>)>,
    fallback: Option<Result<String, String>>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl StubClient {
    /// Replies to every prompt with the same text.
    pub fn with_response(content: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: Some(Ok(content.to_string())),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fails every prompt with the given reason.
    pub fn failing(reason: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: Some(Err(reason.to_string())),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies per prompt: the first rule whose pattern occurs in the
    /// prompt wins, `Ok` becoming a response and `Err` a call failure.
    /// Prompts matching no rule fail loudly.
    pub fn with_rules(rules: Vec<(&str, Result<String, String>)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, outcome)| (pattern.to_string(), outcome))
                .collect(),
            fallback: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before answering. For timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for StubClient {
    fn provider_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let outcome = self
            .rules
            .iter()
            .find(|(pattern, _)| request.prompt.contains(pattern.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .or_else(|| self.fallback.clone());

        match outcome {
            Some(Ok(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            }),
            Some(Err(reason)) => Err(AppError::Llm(reason)),
            None => Err(AppError::Llm(format!(
                "No stub rule matched prompt: {}",
                request.prompt.chars().take(120).collect::<String>()
            ))),
        }
    }
}

/// Cabin pet policy for the first carrier. Contains the phrase
/// "household birds", which appears nowhere else in the corpus.
pub const DELTA_POLICY: &str = "\
# Delta pet policy

Delta allows small dogs, cats, and household birds in the cabin on most
domestic flights. The pet must stay in an approved carrier that fits under
the seat in front of you, and the carrier counts as one carry-on item.
A one-way fee applies, payable at check-in. Pets must remain inside the
carrier with the door closed for the entire flight.
";

/// Cabin pet policy for the second carrier. Contains the phrase
/// "hard-sided or soft-sided", which appears nowhere else in the corpus.
pub const UNITED_POLICY: &str = "\
# United pet policy

United accepts cats and small dogs in the cabin for a fee of 125 dollars
each way. The pet carrier may be hard-sided or soft-sided, must fit under
the seat, and replaces one of your carry-on bags. Reservations for in-cabin
pets are limited per flight, so United recommends booking the pet spot
early. Service animals travel under a separate policy.
";

/// Writes the two-document corpus into `dir` as `delta.md` and `united.md`.
pub fn write_corpus(dir: &Path) {
    std::fs::write(dir.join("delta.md"), DELTA_POLICY).unwrap();
    std::fs::write(dir.join("united.md"), UNITED_POLICY).unwrap();
}

/// Opens an engine over `data_dir` with the default hash-embedding config.
pub fn open_engine(data_dir: &Path, client: Arc<StubClient>) -> QueryEngine {
    QueryEngine::open(data_dir, EngineConfig::default(), client).unwrap()
}
