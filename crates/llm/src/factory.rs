//! LLM provider factory.
//!
//! Creates LLM clients from application configuration: resolves the
//! provider name, injects the endpoint and API key, and returns a shared
//! trait object.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use quarry_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client for the named provider.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama" or "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required by the openai provider
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::InvalidConfiguration(
                    "The openai provider requires an API key".to_string(),
                )
            })?;
            let client = match endpoint {
                Some(base_url) => OpenAiClient::with_base_url(api_key, base_url)?,
                None => OpenAiClient::new(api_key)?,
            };
            Ok(Arc::new(client))
        }
        other => Err(AppError::InvalidConfiguration(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}
