//! Quarry Core Library
//!
//! Foundational utilities shared by the engine and CLI:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Application configuration

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
