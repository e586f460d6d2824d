//! # Structured Logging Module
//!
//! Environment-aware structured logging for dispatch diagnostics.
//!
//! The library itself only emits `tracing` events. Hosts that do not install
//! their own subscriber can call [`init_structured_logging`] once at startup.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{detect_environment, LoggingConfig};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let layer = if config.json {
            fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            json = config.json,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "test" => "debug",
        "development" => "debug",
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for a single handler invocation
pub fn log_dispatch_operation(
    kind: &str,
    message_type: &str,
    handler_type: Option<&str>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        kind = %kind,
        message_type = %message_type,
        handler_type = handler_type,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DISPATCH_OPERATION"
    );
}
