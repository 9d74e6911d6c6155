//! Database module for kiosk-ingest
//!
//! This module provides database connectivity, connection pooling,
//! reference-data resolution and the fact-table writer.

pub mod interaction_repo;
pub mod pool;
pub mod reference_repo;
pub mod repository;

// Re-export commonly used types
pub use interaction_repo::{InteractionRepository, PgInteractionRepository};
pub use pool::{create_pool, DbPool};
pub use reference_repo::ReferenceRepository;
pub use repository::{Repository, RepositoryError, RepositoryResult, RetryConfig};

use sqlx::migrate::Migrator;

/// Database migrator for running schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_embedded() {
        assert!(MIGRATOR.iter().any(|m| m.description.contains("init")));
    }
}
