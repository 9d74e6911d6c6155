//! Reference-data resolution
//!
//! Rating levels and request types are stored once in the `rating` and
//! `request` lookup tables. Resolution looks the value up and inserts it on
//! first sight; the UNIQUE constraint on the value column plus an atomic
//! upsert keeps concurrent resolvers on a single row.

use async_trait::async_trait;

use crate::{
    db::{
        interaction_repo::PgInteractionRepository,
        repository::{execute_with_retry, Repository, RepositoryResult},
    },
    models::{RatingValue, RequestType},
};

/// Maps categorical values to their stable surrogate ids
#[async_trait]
pub trait ReferenceRepository: Repository {
    /// Id of the `rating` row for this level, creating it if needed
    async fn resolve_rating_id(&self, rating: RatingValue) -> RepositoryResult<i32>;

    /// Id of the `request` row for this type, creating it if needed
    async fn resolve_request_type_id(&self, request_type: RequestType) -> RepositoryResult<i32>;
}

/// SQL for one lookup table
struct ReferenceTable {
    name: &'static str,
    select: &'static str,
    upsert: &'static str,
}

static RATING_TABLE: ReferenceTable = ReferenceTable {
    name: "rating",
    select: "SELECT rating_id FROM rating WHERE rating_value = $1",
    upsert: r#"
        INSERT INTO rating (rating_value, rating_description)
        VALUES ($1, $2)
        ON CONFLICT (rating_value) DO UPDATE SET rating_value = EXCLUDED.rating_value
        RETURNING rating_id
    "#,
};

static REQUEST_TABLE: ReferenceTable = ReferenceTable {
    name: "request",
    select: "SELECT request_id FROM request WHERE request_value = $1",
    upsert: r#"
        INSERT INTO request (request_value, request_description)
        VALUES ($1, $2)
        ON CONFLICT (request_value) DO UPDATE SET request_value = EXCLUDED.request_value
        RETURNING request_id
    "#,
};

impl PgInteractionRepository {
    async fn resolve_reference(
        &self,
        table: &'static ReferenceTable,
        value: i32,
        description: &'static str,
    ) -> RepositoryResult<i32> {
        let pool = self.pool().clone();

        let id = execute_with_retry(self.retry_config(), || {
            let pool = pool.clone();
            Box::pin(async move {
                let existing = sqlx::query_scalar::<_, i32>(table.select)
                    .bind(value)
                    .fetch_optional(&pool)
                    .await?;

                if let Some(id) = existing {
                    return Ok(id);
                }

                let mut tx = pool.begin().await?;
                let id = sqlx::query_scalar::<_, i32>(table.upsert)
                    .bind(value)
                    .bind(description)
                    .fetch_one(&mut *tx)
                    .await?;
                tx.commit().await?;

                tracing::info!(table = table.name, value, id, "Created reference row");
                Ok(id)
            })
        })
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl ReferenceRepository for PgInteractionRepository {
    async fn resolve_rating_id(&self, rating: RatingValue) -> RepositoryResult<i32> {
        self.resolve_reference(&RATING_TABLE, rating.value(), rating.description())
            .await
    }

    async fn resolve_request_type_id(&self, request_type: RequestType) -> RepositoryResult<i32> {
        self.resolve_reference(
            &REQUEST_TABLE,
            request_type.value(),
            request_type.description(),
        )
        .await
    }
}
