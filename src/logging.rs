//! Logging module for kiosk-ingest
//!
//! This module configures structured logging using the tracing crate,
//! providing JSON output for production and pretty formatting for development.
//! Rejections, sampled messages and partition notices go to the
//! [`DIAGNOSTICS_TARGET`] target, which can be diverted to a file.

use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    filter::{self, FilterExt, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

/// Tracing target for rejection and audit records
pub const DIAGNOSTICS_TARGET: &str = "diagnostics";

/// Initialize the logging system
///
/// Configures tracing based on the environment:
/// - Production: JSON formatted logs
/// - Development: Pretty formatted logs with colors
///
/// When `diagnostics_file` is set, diagnostics records are appended to that
/// file instead of the console.
pub fn init_tracing(runtime: &RuntimeConfig, diagnostics_file: Option<&Path>) -> Result<()> {
    // Create environment filter from RUST_LOG or use provided log level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "kiosk_ingest={},{}=info,sqlx=warn,rdkafka=warn",
            runtime.log_level, DIAGNOSTICS_TARGET
        ))
    });

    let to_file = diagnostics_file.is_some();
    let console_filter = filter::filter_fn(move |metadata| {
        !(to_file && metadata.target() == DIAGNOSTICS_TARGET)
    });

    let console_layer: Box<dyn Layer<Registry> + Send + Sync> = if runtime.is_production() {
        fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_target(true)
            .boxed()
    };

    let file_layer = match diagnostics_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(Targets::new().with_target(DIAGNOSTICS_TARGET, Level::INFO)),
            )
        },
        None => None,
    };

    Registry::default()
        .with(console_layer.with_filter(env_filter.and(console_filter)))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!(
        environment = %runtime.environment,
        log_level = %runtime.log_level,
        diagnostics_file = ?diagnostics_file,
        "Logging initialized"
    );

    Ok(())
}

/// A rejected message together with the reasons it was rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Copy of the offending message, annotated under `invalid`
    pub record: Value,
    /// Reason codes such as `invalid site`
    pub reasons: Vec<String>,
}

impl Rejection {
    pub fn new(record: Value, reasons: Vec<String>) -> Self {
        Self { record, reasons }
    }
}

/// Destination for rejected messages
pub trait RejectSink: Send + Sync {
    /// Record one rejected message
    fn reject(&self, rejection: &Rejection);
}

/// Writes rejections to the diagnostics target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRejectSink;

impl RejectSink for TracingRejectSink {
    fn reject(&self, rejection: &Rejection) {
        tracing::warn!(
            target: DIAGNOSTICS_TARGET,
            reasons = ?rejection.reasons,
            record = %rejection.record,
            "Rejected interaction"
        );
    }
}

/// Create a span for Kafka message processing
#[macro_export]
macro_rules! kafka_span {
    ($partition:expr, $offset:expr) => {
        tracing::info_span!(
            "kafka_message",
            partition = $partition,
            offset = $offset,
            outcome = tracing::field::Empty,
            processing_time_ms = tracing::field::Empty,
        )
    };
}

/// Create a span for database operations
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "database",
            operation = $operation,
            rows_affected = tracing::field::Empty,
        )
    };
}

/// Log an error with context
#[macro_export]
macro_rules! log_error {
    ($error:expr, $msg:expr) => {
        tracing::error!(
            error = %$error,
            error_type = ?$error,
            $msg
        )
    };
    ($error:expr, $msg:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::error!(
            error = %$error,
            error_type = ?$error,
            $($key = tracing::field::display(&$value),)*
            $msg
        )
    };
}

/// Helper for timing operations
pub struct Timer {
    start: std::time::Instant,
    operation: String,
}

impl Timer {
    /// Start a new timer
    pub fn start(operation: impl Into<String>) -> Self {
        Timer {
            start: std::time::Instant::now(),
            operation: operation.into(),
        }
    }

    /// Stop the timer and log the duration
    pub fn stop(self) -> std::time::Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let duration = timer.stop();
        assert!(duration.as_millis() >= 10);
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        let rejection = Rejection::new(
            json!({"site": "9", "invalid": ["invalid site"]}),
            vec!["invalid site".to_string()],
        );
        TracingRejectSink.reject(&rejection);
    }

    #[test]
    fn test_rejection_serializes() {
        let rejection = Rejection::new(json!({"val": 9}), vec!["invalid val".to_string()]);
        let json = serde_json::to_string(&rejection).unwrap();
        assert!(json.contains("\"reasons\":[\"invalid val\"]"));
        assert!(json.contains("\"record\":{\"val\":9}"));
    }
}
