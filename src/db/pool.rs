//! Database connection pool management for kiosk-ingest
//!
//! The ingest loop is sequential, so the pool defaults to a single connection
//! that is created at startup, shared by every repository and closed on
//! shutdown.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Type alias for the database connection pool
pub type DbPool = PgPool;

/// Application name reported to Postgres
pub const APPLICATION_NAME: &str = "kiosk-ingest";

/// Build connection options from the discrete database settings
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.name)
        .application_name(APPLICATION_NAME)
}

/// Open the pool and prove one connection works before returning it
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_max_size)
        .acquire_timeout(config.acquire_timeout())
        .test_before_acquire(true)
        .max_lifetime(Some(Duration::from_secs(3600)))
        .connect_with(connect_options(config))
        .await
        .map_err(|e| Error::storage(format!("Failed to create connection pool: {}", e)))?;

    super::check_connection(&pool)
        .await
        .map_err(|e| Error::storage(format!("Failed to verify database connection: {}", e)))?;

    tracing::info!(
        target_url = %config.masked_url(),
        max_connections = config.pool_max_size,
        "Database connection pool created"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_from_discrete_fields() {
        let config = DatabaseConfig {
            host: "db.internal".to_string(),
            port: 6543,
            username: "museum".to_string(),
            password: "secret".to_string(),
            name: "lmnh".to_string(),
            pool_max_size: 1,
            acquire_timeout_seconds: 30,
            run_migrations: false,
        };

        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "museum");
        assert_eq!(options.get_database(), Some("lmnh"));
        assert_eq!(options.get_application_name(), Some(APPLICATION_NAME));
    }
}
