// Carbon Audit - Web Server
// REST API with Axum over the shared record store

use anyhow::{Context, Result};
use std::path::PathBuf;

use carbon_audit::api::{router, AppState};
use carbon_audit::{AppConfig, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var_os("CARBON_AUDIT_CONFIG").map(PathBuf::from);
    let mut config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;
    if let Some(db) = std::env::var_os("CARBON_AUDIT_DB") {
        config.database_path = PathBuf::from(db);
    }

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))?;
    tracing::info!(path = %config.database_path.display(), "database opened");

    let addr = config.server.bind_address.clone();
    let app = router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!(%addr, "🚀 carbon-audit API listening");

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
