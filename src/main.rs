use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod config;
mod credentials;
mod llm;
mod schema;
mod session;
mod sql;
mod util;
mod warehouse;
mod web;

#[cfg(test)]
mod testing;

use crate::config::{AppConfig, CliArgs, LogFormat};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::warehouse::bigquery::BigQueryGateway;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration; logging depends on it
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Text);
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.logging.format);

    let llm = LlmManager::new(&config.llm)?;
    info!("Initialized LLM manager with backend: {}", llm.backend());

    info!("Initializing BigQuery gateway at {}", config.warehouse.api_url);
    let warehouse = BigQueryGateway::new(&config.warehouse)?;

    let app_state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(llm),
        Arc::new(warehouse),
    )?);

    // Sweep abandoned sessions
    let sweeper_state = Arc::clone(&app_state);
    let sweep_every = Duration::from_secs((config.session.idle_timeout_secs / 4).clamp(1, 300));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            sweeper_state.sessions.prune_expired().await;
        }
    });

    // Start the web server
    info!("Starting {} on {}:{}", config.web.title, config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
