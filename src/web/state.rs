use crate::config::AppConfig;
use crate::db::schema::SchemaCatalog;
use crate::llm::LlmManager;
use sqlx::postgres::PgPool;
use std::time::Duration;

/// Shared application state: the process-wide pool, LLM client and
/// schema cache, built once at startup and injected into every handler.
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: PgPool,
    pub llm_manager: LlmManager,
    pub schema_catalog: SchemaCatalog,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: PgPool, llm_manager: LlmManager) -> Self {
        let schema_catalog = SchemaCatalog::new(db_pool.clone(), config.database.schema.clone());

        Self {
            config,
            db_pool,
            llm_manager,
            schema_catalog,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.config.database.query_timeout_secs)
    }
}
