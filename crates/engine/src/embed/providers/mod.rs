//! Embedding provider implementations.

pub mod hash;
pub mod ollama;
