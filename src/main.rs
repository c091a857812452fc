mod config;
mod db;
mod errors;
mod logging;
mod models;
mod routes;
mod schema;
mod security;
mod services;
mod state;
mod store;

use std::{net::SocketAddr, sync::Arc};

use axum::serve;
use config::AppConfig;
use db::establish_pool;
use routes::build_app;
use state::AppState;
use store::PgStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let pool = establish_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, store.clone(), store);
    let app = build_app(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "Listening");

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
