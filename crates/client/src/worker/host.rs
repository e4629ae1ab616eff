//! Hosting runtime for worker versions.
//!
//! The host dispatches lifecycle events in order: install settles before
//! activation starts, and fetches reach a worker only after its activation
//! settled. Pages that are not controlled go straight to the network.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::clients::{ClientId, Clients};
use super::{FetchOutcome, InstallReport, OfflineWorker};
use crate::fetch::Network;
use vrcache_core::{Error, Request};

/// What happened while bringing a worker version up.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StartReport {
    pub install: InstallReport,
    /// Stores removed during activation.
    pub deleted_caches: Vec<String>,
    /// Activation cleanup error, if any. The worker is active regardless.
    pub activate_error: Option<String>,
    /// Clients taken over right after activation.
    pub claimed_clients: usize,
}

/// Runs worker versions and routes client fetches to the active one.
pub struct WorkerHost {
    network: Arc<dyn Network>,
    clients: Clients,
    active: RwLock<Option<Arc<OfflineWorker>>>,
}

impl WorkerHost {
    /// `network` serves fetches from clients no worker controls.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network, clients: Clients::new(), active: RwLock::new(None) }
    }

    /// Install then activate `worker`, replacing the current version.
    ///
    /// The previous version keeps serving until the new one has installed;
    /// it turns redundant when the new one starts activating.
    pub async fn start(&self, worker: Arc<OfflineWorker>) -> Result<StartReport, Error> {
        let install = worker.install().await?;
        worker.lifecycle().wait_for(super::WorkerState::Installed).await?;

        let previous = self.active.write().await.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.flush().await;
            if let Err(e) = previous.retire() {
                tracing::warn!(cache_name = %previous.cache_name(), error = %e, "could not retire previous worker");
            }
        }

        let (deleted_caches, activate_error) = match worker.activate().await {
            Ok(deleted) => (deleted, None),
            Err(Error::InvalidState(msg)) => return Err(Error::InvalidState(msg)),
            Err(e) => {
                tracing::error!(cache_name = %worker.cache_name(), error = %e, "cache cleanup failed during activation");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let claimed_clients = if worker.settings().claim_clients { self.claim() } else { 0 };

        tracing::info!(
            cache_name = %worker.cache_name(),
            offline_ready = install.is_complete(),
            deleted = deleted_caches.len(),
            claimed = claimed_clients,
            "worker active"
        );

        Ok(StartReport { install, deleted_caches, activate_error, claimed_clients })
    }

    pub async fn active_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.active.read().await.clone()
    }

    async fn has_active_worker(&self) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .is_some_and(|worker| worker.state().can_intercept_fetch())
    }

    /// Open a page. It is controlled only if a worker is already active.
    pub async fn open_client(&self) -> ClientId {
        let controlled = self.has_active_worker().await;
        let id = self.clients.open(controlled);
        tracing::debug!(client = %id, controlled, "client opened");
        id
    }

    /// Reload a page, picking up the active worker if there is one.
    pub async fn reload_client(&self, id: ClientId) -> Result<(), Error> {
        let controlled = self.has_active_worker().await;
        if !self.clients.reload(id, controlled) {
            return Err(Error::InvalidInput(format!("unknown {id}")));
        }
        Ok(())
    }

    pub fn close_client(&self, id: ClientId) -> bool {
        self.clients.close(id)
    }

    /// Take control of every open page immediately.
    pub fn claim(&self) -> usize {
        let claimed = self.clients.claim();
        tracing::debug!(claimed, "clients claimed");
        claimed
    }

    pub fn is_controlled(&self, id: ClientId) -> Option<bool> {
        self.clients.is_controlled(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Route a request from `client` through the worker or straight to the network.
    pub async fn dispatch_fetch(&self, client: ClientId, request: Request) -> Result<FetchOutcome, Error> {
        let controlled = self
            .clients
            .is_controlled(client)
            .ok_or_else(|| Error::InvalidInput(format!("unknown {client}")))?;

        if controlled
            && let Some(worker) = self.active_worker().await
            && worker.state().can_intercept_fetch()
        {
            return worker.handle_fetch(request).await;
        }

        let response = self.network.fetch(&request).await?;
        Ok(FetchOutcome::network(response, false))
    }

    /// Let background cache writes of the active worker finish.
    pub async fn shutdown(&self) {
        if let Some(worker) = self.active_worker().await {
            worker.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{FetchSource, WorkerState};
    use super::*;
    use vrcache_core::{CacheStore, MemoryStore};

    fn host_with(network: &Arc<StubNetwork>) -> WorkerHost {
        let network: Arc<dyn Network> = Arc::clone(network) as Arc<dyn Network>;
        WorkerHost::new(network)
    }

    fn version(name: &str, store: &Arc<dyn CacheStore>, network: &Arc<StubNetwork>, claim: bool) -> Arc<OfflineWorker> {
        let mut settings = settings(name, &["./index.html"]);
        settings.claim_clients = claim;
        let network: Arc<dyn Network> = Arc::clone(network) as Arc<dyn Network>;
        Arc::new(OfflineWorker::new(settings, Arc::clone(store), network))
    }

    #[tokio::test]
    async fn test_start_installs_then_activates() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);

        let worker = version("v1", &store, &network, true);
        let report = host.start(Arc::clone(&worker)).await.unwrap();

        assert!(report.install.is_complete());
        assert!(report.activate_error.is_none());
        assert_eq!(worker.state(), WorkerState::Activated);
        assert!(host.active_worker().await.is_some());
    }

    #[tokio::test]
    async fn test_uncontrolled_client_bypasses_worker() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);

        let early = host.open_client().await;
        host.start(version("v1", &store, &network, false)).await.unwrap();

        assert_eq!(host.is_controlled(early), Some(false));
        let calls = network.calls();
        let outcome = host.dispatch_fetch(early, Request::get(url("index.html"))).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Network);
        assert_eq!(network.calls(), calls + 1);

        host.reload_client(early).await.unwrap();
        let outcome = host.dispatch_fetch(early, Request::get(url("index.html"))).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Cache);
    }

    #[tokio::test]
    async fn test_claim_takes_over_open_clients() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);

        let early = host.open_client().await;
        let report = host.start(version("v1", &store, &network, true)).await.unwrap();

        assert_eq!(report.claimed_clients, 1);
        let outcome = host.dispatch_fetch(early, Request::get(url("index.html"))).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Cache);
    }

    #[tokio::test]
    async fn test_client_opened_after_activation_is_controlled() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);
        host.start(version("v1", &store, &network, false)).await.unwrap();

        let client = host.open_client().await;
        assert_eq!(host.is_controlled(client), Some(true));
    }

    #[tokio::test]
    async fn test_version_bump_replaces_worker_and_store() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);

        let v1 = version("video-reverser-cache-v1", &store, &network, true);
        host.start(Arc::clone(&v1)).await.unwrap();
        let v2 = version("video-reverser-cache-v2", &store, &network, true);
        let report = host.start(Arc::clone(&v2)).await.unwrap();

        assert_eq!(report.deleted_caches, vec!["video-reverser-cache-v1".to_string()]);
        assert_eq!(v1.state(), WorkerState::Redundant);
        assert_eq!(v2.state(), WorkerState::Activated);
        assert_eq!(store.keys().await.unwrap(), vec!["video-reverser-cache-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_still_activates() {
        let store: Arc<dyn CacheStore> = Arc::new(FailingStore::new());
        store.open("video-reverser-cache-v0").await.unwrap();
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        let host = host_with(&network);
        let early = host.open_client().await;

        let worker = version("video-reverser-cache-v1", &store, &network, true);
        let report = host.start(Arc::clone(&worker)).await.unwrap();

        assert!(report.activate_error.unwrap().contains("CACHE_ERROR"));
        assert!(report.deleted_caches.is_empty());
        assert_eq!(report.claimed_clients, 1);
        assert_eq!(worker.state(), WorkerState::Activated);
        assert!(store.has("video-reverser-cache-v0").await.unwrap());
        assert_eq!(host.is_controlled(early), Some(true));
    }

    #[tokio::test]
    async fn test_unknown_client_rejected() {
        let network = Arc::new(StubNetwork::new());
        let host = host_with(&network);
        let client = host.open_client().await;
        host.close_client(client);

        let result = host.dispatch_fetch(client, Request::get(url("index.html"))).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(host.reload_client(client).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_writes() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let network = Arc::new(StubNetwork::new());
        network.serve_asset("index.html", "<html>");
        network.serve_asset("app.js", "js");
        let host = host_with(&network);
        host.start(version("v1", &store, &network, true)).await.unwrap();
        let client = host.open_client().await;

        host.dispatch_fetch(client, Request::get(url("app.js"))).await.unwrap();
        host.shutdown().await;

        assert!(store.match_request("v1", &Request::get(url("app.js"))).await.unwrap().is_some());
    }
}
