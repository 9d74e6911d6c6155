//! Interaction repository implementation for kiosk-ingest
//!
//! This module provides the PostgreSQL writer for the two fact tables. Every
//! insert runs in its own transaction and is committed before returning, so a
//! returned id means the row is durable.

use async_trait::async_trait;
use chrono::Utc;
use tracing::Instrument;

use crate::{
    db::{
        repository::{
            execute_with_retry, Repository, RepositoryError, RepositoryResult, RetryConfig,
        },
        DbPool,
    },
    db_span,
    models::{FactRow, Interaction, Site, ValidatedEvent},
};

/// Writer for the rating and request fact tables
#[async_trait]
pub trait InteractionRepository: Repository {
    /// Insert one row into `rating_interaction`
    async fn insert_rating_interaction(&self, row: &FactRow) -> RepositoryResult<i64>;

    /// Insert one row into `request_interaction`
    async fn insert_request_interaction(&self, row: &FactRow) -> RepositoryResult<i64>;

    /// Number of stored rating interactions
    async fn count_rating_interactions(&self) -> RepositoryResult<i64>;

    /// Number of stored request interactions
    async fn count_request_interactions(&self) -> RepositoryResult<i64>;

    /// Persist a validated event against an already resolved reference id
    async fn persist(
        &self,
        event: &ValidatedEvent,
        exhibition_id: i32,
        reference_id: i32,
    ) -> RepositoryResult<i64> {
        let row = FactRow {
            exhibition_id,
            reference_id,
            event_at: event.at.with_timezone(&Utc),
        };

        match event.interaction {
            Interaction::Rating(_) => self.insert_rating_interaction(&row).await,
            Interaction::Request(_) => self.insert_request_interaction(&row).await,
        }
    }
}

const INSERT_RATING_INTERACTION: &str = r#"
    INSERT INTO rating_interaction (exhibition_id, rating_id, event_at)
    VALUES ($1, $2, $3)
    RETURNING rating_interaction_id
"#;

const INSERT_REQUEST_INTERACTION: &str = r#"
    INSERT INTO request_interaction (exhibition_id, request_id, event_at)
    VALUES ($1, $2, $3)
    RETURNING request_interaction_id
"#;

const COUNT_EXHIBITIONS: &str = "SELECT COUNT(*) FROM exhibition";

/// PostgreSQL implementation of the reference and interaction repositories
#[derive(Clone)]
pub struct PgInteractionRepository {
    pool: DbPool,
    retry_config: RetryConfig,
}

impl PgInteractionRepository {
    /// Create a new PostgreSQL repository
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            retry_config: RetryConfig::default(),
        }
    }

    /// Create with custom retry configuration
    pub fn with_retry_config(pool: DbPool, retry_config: RetryConfig) -> Self {
        Self { pool, retry_config }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    async fn insert_fact(&self, sql: &'static str, row: &FactRow) -> RepositoryResult<i64> {
        let pool = self.pool.clone();
        let row = row.clone();

        execute_with_retry(&self.retry_config, || {
            let pool = pool.clone();
            let row = row.clone();
            Box::pin(async move {
                let mut tx = pool.begin().await?;

                let id = sqlx::query_scalar::<_, i64>(sql)
                    .bind(row.exhibition_id)
                    .bind(row.reference_id)
                    .bind(row.event_at)
                    .fetch_one(&mut *tx)
                    .await?;

                tx.commit()
                    .await
                    .map_err(|e| RepositoryError::Transaction(e.to_string()))?;

                Ok(id)
            })
        })
        .await
    }

    async fn count(&self, sql: &'static str) -> RepositoryResult<i64> {
        let pool = self.pool.clone();

        execute_with_retry(&self.retry_config, || {
            let pool = pool.clone();
            Box::pin(async move {
                let count = sqlx::query_scalar::<_, i64>(sql).fetch_one(&pool).await?;
                Ok(count)
            })
        })
        .await
    }
}

#[async_trait]
impl Repository for PgInteractionRepository {
    /// Reachable, and the exhibition dimension is seeded
    async fn health_check(&self) -> RepositoryResult<()> {
        let exhibitions: i64 = sqlx::query_scalar(COUNT_EXHIBITIONS)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::Connection(format!("Health check failed: {}", e)))?;

        if exhibitions < Site::ALL.len() as i64 {
            return Err(RepositoryError::QueryExecution(format!(
                "exhibition table has {} rows, expected {}; are migrations applied?",
                exhibitions,
                Site::ALL.len()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl InteractionRepository for PgInteractionRepository {
    async fn insert_rating_interaction(&self, row: &FactRow) -> RepositoryResult<i64> {
        self.insert_fact(INSERT_RATING_INTERACTION, row)
            .instrument(db_span!("insert_rating_interaction"))
            .await
    }

    async fn insert_request_interaction(&self, row: &FactRow) -> RepositoryResult<i64> {
        self.insert_fact(INSERT_REQUEST_INTERACTION, row)
            .instrument(db_span!("insert_request_interaction"))
            .await
    }

    async fn count_rating_interactions(&self) -> RepositoryResult<i64> {
        self.count("SELECT COUNT(*) FROM rating_interaction").await
    }

    async fn count_request_interactions(&self) -> RepositoryResult<i64> {
        self.count("SELECT COUNT(*) FROM request_interaction").await
    }
}
