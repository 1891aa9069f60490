//! subql HTTP server
//!
//! Executes SQL against a shared in-memory database and exchanges Substrait
//! plans with other engines.

use std::path::Path;
use subql_engine::Database;
use tracing::info;

mod config;
mod logging;
mod metrics;
mod routes;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("SUBQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::from_env()?
    };

    config.apply_logging_env();
    logging::init();

    let state = routes::AppState::new(
        Database::new(),
        config.execution.budget(),
        config.execution.plan_format,
        metrics::Metrics::new()?,
    );
    let app = routes::router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        addr = %addr,
        plan_format = %config.execution.plan_format,
        max_rows = ?config.execution.max_rows,
        "subql server listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
