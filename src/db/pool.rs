use crate::config::DatabaseConfig;
use crate::db::DbError;
use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Builds the process-wide Postgres pool. Constructed once at startup and
/// injected into the web state; never rebuilt per request.
///
/// Every pooled connection gets its search_path pinned to the configured
/// schema so generated SQL can use bare table names.
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let search_path = format!("SET search_path TO \"{}\"", config.schema.replace('"', ""));

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size + config.max_overflow)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(move |conn, _meta| {
            let set_path = search_path.clone();
            Box::pin(async move {
                conn.execute(set_path.as_str()).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(|e| DbError::Pool(e.to_string()))?;

    // Probe the connection before we agree to serve
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| DbError::Pool(e.to_string()))?;

    info!(
        "Database pool ready (schema '{}', max {} connections)",
        config.schema,
        config.pool_size + config.max_overflow
    );

    Ok(pool)
}
