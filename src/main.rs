use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod report;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env first so DATABASE_URL / LLM_API_KEY are visible to config
    dotenv::dotenv().ok();

    init_tracing();

    let args = CliArgs::parse();

    // Missing database URL or API key is fatal here, by design
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Connecting to database (schema '{}')",
        config.database.schema
    );
    let pool = db::pool::init_pool(&config.database).await?;

    info!("Initializing LLM client with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager));

    // Warm the schema cache; a failure here is not fatal, the catalog
    // introspects lazily on the first request instead
    info!("Warming schema cache");
    if let Err(e) = app_state.schema_catalog.refresh().await {
        error!("Failed to warm schema cache: {}", e);
    }

    info!(
        "Starting Ask-BI server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(()) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}
