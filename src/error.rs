//! Crate-wide error type
//!
//! Everything that can stop the ingest process ends up here. Per-message
//! problems (validation rejections, skipped storage failures) never do.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons the process stops or refuses to start
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Pool, migration or persistence failure
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Broker error other than end-of-partition
    #[error("Kafka broker error: {0}")]
    Broker(String),

    #[error("Offset commit failed: {0}")]
    OffsetCommit(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    pub fn broker<S: Into<String>>(msg: S) -> Self {
        Error::Broker(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Short name logged alongside fatal errors
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Storage(_) => "storage",
            Error::Broker(_) => "broker",
            Error::OffsetCommit(_) => "offset_commit",
            Error::Json(_) => "json",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

// rdkafka client setup reports through anyhow
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Broker(format!("{:#}", err))
    }
}

impl From<envconfig::Error> for Error {
    fn from(err: envconfig::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Storage(format!("migration failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::config("x").kind(), "config");
        assert_eq!(Error::storage("x").kind(), "storage");
        assert_eq!(Error::OffsetCommit("x".into()).kind(), "offset_commit");
    }

    #[test]
    fn test_anyhow_context_is_kept() {
        let err: Error = Err::<(), _>(anyhow::anyhow!("no route to host"))
            .context("Failed to create Kafka consumer")
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), "broker");
        assert_eq!(
            err.to_string(),
            "Kafka broker error: Failed to create Kafka consumer: no route to host"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::storage("connection refused");
        assert_eq!(err.to_string(), "Storage failure: connection refused");
    }
}
