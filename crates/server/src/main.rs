//! vrcache server entry point.
//!
//! Boots the offline worker (install, then activate) against the configured
//! cache database and exposes it as an MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;
use vrcache_client::{FetchClient, FetchConfig, Network, OfflineWorker, WorkerHost, WorkerSettings};
use vrcache_core::{AppConfig, CacheDb};

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(cache_name = %config.cache_name, scope = %config.scope_url, "starting vrcache");

    let db = CacheDb::open(&config.db_path).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from_app(&config)?)?);
    let settings = WorkerSettings::from_app(&config)?;
    let scope = settings.scope.clone();

    let host = Arc::new(WorkerHost::new(Arc::clone(&network)));
    let worker = Arc::new(OfflineWorker::new(settings, Arc::new(db), network));
    let report = host.start(worker).await?;
    if !report.install.is_complete() {
        tracing::warn!(error = ?report.install.error, "offline support incomplete for this version");
    }

    let client = host.open_client().await;
    let handler = handler::VrCacheServer::new(Arc::clone(&host), client, scope);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    host.shutdown().await;

    Ok(())
}
