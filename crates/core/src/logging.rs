//! Logging infrastructure for the Quarry CLI.
//!
//! Initializes the tracing subscriber. All logs go to stderr so stdout
//! stays clean for command output (reports, answers, JSON).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Initialize the tracing subscriber with stderr output.
///
/// The filter comes from `log_level` when given, otherwise `RUST_LOG`,
/// otherwise "info". Can only succeed once per process.
///
/// # Arguments
/// * `log_level` - Optional log level override (e.g. "debug", "quarry_engine=trace")
/// * `no_color` - Disable colored output
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_str = log_level.unwrap_or(&default_level);

    let env_filter = EnvFilter::try_new(filter_str)
        .map_err(|e| AppError::InvalidConfiguration(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(!no_color && std::env::var("NO_COLOR").is_err());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::InvalidConfiguration(format!("Failed to init logging: {}", e)))?;

    Ok(())
}
