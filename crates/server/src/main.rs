//! precache-proxy server entry point.
//!
//! Loads configuration, opens the cache store, runs the install/activate
//! lifecycle for the configured version and then serves MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use precache_client::{FetchClient, FetchConfig};
use precache_core::{AppConfig, CacheDb, Worker};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let origin = config.origin_url()?;

    tracing::info!(
        origin = %origin,
        identity = %config.identity(),
        db_path = %config.db_path.display(),
        "Starting precache-proxy on stdio transport"
    );

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache store at {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(Worker::from_config(&config, db.clone(), network).await?);

    match worker.run_lifecycle().await {
        Ok(state) => tracing::info!(state = %state, "lifecycle complete"),
        Err(e) => tracing::warn!(error = %e, "lifecycle incomplete; serving from previous live instance"),
    }

    let handler = handler::PrecacheServer::new(worker, db, origin);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
