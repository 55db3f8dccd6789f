//! LLM integration crate for Quarry.
//!
//! Provider-agnostic abstraction for the reasoning and answering calls
//! made by the query engine: decomposition, per-sub-question answering,
//! synthesis, and metadata extraction all go through `LlmClient`.
//!
//! # Providers
//! - **Ollama**: local LLM runtime (default)
//! - **OpenAI**: any OpenAI-compatible chat completions endpoint
//!
//! # Example
//! ```no_run
//! use quarry_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Summarize the refund policy.", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
