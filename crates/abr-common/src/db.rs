//! Connection pool construction.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{AbrError, Result};

/// Create a connection pool from the given configuration.
///
/// The pool is sized small on purpose: ingestion holds one connection
/// for the duration of a run and resolution holds one per call.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(config.connect_options())
        .await
        .map_err(AbrError::Connection)?;

    tracing::info!(
        host = %config.host,
        database = %config.database,
        max_connections = config.max_connections,
        "database connection pool created"
    );

    Ok(pool)
}
