//! Storage errors, the base repository trait and the retry policy
//!
//! Both Postgres repositories run every statement through
//! [`execute_with_retry`], so only the failures listed in
//! [`RepositoryError::is_retryable`] are ever attempted twice.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// SQLSTATE codes worth another attempt: serialization failure and deadlock
const TRANSIENT_SQLSTATES: [&str; 2] = ["40001", "40P01"];

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Could not reach the server or the pool gave up waiting
    #[error("Database connection error: {0}")]
    Connection(String),

    /// A statement failed for a reason other than connectivity
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    /// Begin or commit failed; the insert may not have landed
    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    /// Whether the same statement may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            RepositoryError::Connection(_) => true,
            RepositoryError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|c| *c == code)),
            RepositoryError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
            ),
            RepositoryError::QueryExecution(_) | RepositoryError::Transaction(_) => false,
        }
    }
}

impl From<RepositoryError> for crate::error::Error {
    fn from(err: RepositoryError) -> Self {
        crate::error::Error::storage(err.to_string())
    }
}

/// Base repository trait
#[async_trait]
pub trait Repository: Send + Sync {
    async fn health_check(&self) -> RepositoryResult<()>;
}

/// Retry configuration for repository operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the initial backoff
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set the maximum backoff
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// At most `max_retries` retries follow the first attempt; permanent errors
/// are returned immediately.
pub async fn execute_with_retry<F, T>(config: &RetryConfig, mut operation: F) -> RepositoryResult<T>
where
    F: FnMut() -> BoxFuture<'static, RepositoryResult<T>>,
{
    let max_retries = config.max_retries;
    let mut attempts: u32 = 0;

    retry(config.backoff(), || {
        attempts += 1;
        let attempt = attempts;
        let pending = operation();
        async move {
            match pending.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    tracing::warn!(error = ?e, attempt, "Retrying database operation");
                    Err(backoff::Error::transient(e))
                },
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}
