//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//!
//! - level from the configured directive, else `RUST_LOG`, else derived from
//!   `TASKER_ENV` (`production` logs at `info`, everything else at `debug`)
//! - `pretty` or `json` output, ANSI colours only when stdout is a TTY
//! - installed once per process; an already-installed subscriber is left alone
//!
//! Run-level and task-level helpers keep field names consistent across the
//! run loop and the backends (`run_id`, `task_id`, `batch`).

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};
use uuid::Uuid;

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::env as env_vars;
use crate::models::TaskId;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured console logging
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = build_filter(config, &environment);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .with_filter(filter)
                .boxed(),
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                format = ?config.format,
                "Structured logging initialized"
            );
        }
    });
}

fn build_filter(config: &LoggingConfig, environment: &str) -> EnvFilter {
    if let Some(level) = config.level.as_deref() {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(get_log_level(environment)))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(env_vars::ENVIRONMENT).unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for run-level operations
pub fn log_run_operation(operation: &str, run_id: Uuid, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "RUN_OPERATION"
    );
}

/// Log the committed outcome of one task
pub fn log_task_outcome(run_id: Uuid, task_id: &TaskId, succeeded: bool) {
    tracing::debug!(
        run_id = %run_id,
        task_id = %task_id,
        status = if succeeded { "succeeded" } else { "failed" },
        "TASK_OUTCOME"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig {
            format: LogFormat::Json,
            level: Some("warn".to_string()),
        };
        init_structured_logging(&config);
        init_structured_logging(&LoggingConfig::default());
        log_run_operation("test", Uuid::new_v4(), "ok", None);
    }
}
