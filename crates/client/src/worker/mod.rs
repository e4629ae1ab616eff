//! Offline asset cache manager.
//!
//! One [`OfflineWorker`] is one version of the worker: it owns a cache name,
//! the asset manifest, and the three lifecycle handlers.
//!
//! ### Install
//! Opens the versioned store and pre-caches every manifest asset as one
//! all-or-nothing batch. A failed batch is logged and reported but the worker
//! still reaches `Installed`; offline support is then incomplete.
//!
//! ### Fetch
//! Cache first. On a miss the network response is returned, and a clone is
//! written back in the background when it is a same-origin 200 for a GET.
//! A failed cache lookup falls back to the network without caching.
//!
//! ### Activate
//! Deletes every store whose name is not the current cache name.

pub mod clients;
pub mod host;
pub mod lifecycle;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use url::Url;

use crate::fetch::{Network, canonicalize, parse_scope, resolve};
use vrcache_core::{AppConfig, CacheStore, Error, Manifest, Request, Response, ResponseType};

pub use clients::{ClientId, Clients};
pub use host::{StartReport, WorkerHost};
pub use lifecycle::{Lifecycle, WorkerState};

/// Per-version settings injected into a worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub cache_name: String,
    pub scope: Url,
    pub manifest: Manifest,
    pub claim_clients: bool,
}

impl WorkerSettings {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let scope = parse_scope(&config.scope_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            cache_name: config.cache_name.clone(),
            scope,
            manifest: config.manifest(),
            claim_clients: config.claim_clients,
        })
    }

    /// Store names that survive activation.
    pub fn whitelist(&self) -> Vec<String> {
        vec![self.cache_name.clone()]
    }
}

/// Outcome of the install handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub cache_name: String,
    /// Assets listed in the manifest.
    pub requested: usize,
    /// Assets stored by this install (0 or `requested`).
    pub cached: usize,
    /// Why the batch failed, if it did.
    pub error: Option<String>,
    /// RFC 3339 time the install settled.
    pub finished_at: String,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Where a fetch was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Cache,
    Network,
}

/// Response handed back to the caller of a fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: FetchSource,
    /// A copy was queued for the store.
    pub stored: bool,
}

impl FetchOutcome {
    fn network(response: Response, stored: bool) -> Self {
        Self { response, source: FetchSource::Network, stored }
    }
}

/// One version of the offline cache worker.
pub struct OfflineWorker {
    settings: WorkerSettings,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    lifecycle: Lifecycle,
    pending_writes: Mutex<JoinSet<()>>,
    last_install: Mutex<Option<InstallReport>>,
}

impl OfflineWorker {
    pub fn new(settings: WorkerSettings, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Self {
        Self {
            settings,
            store,
            network,
            lifecycle: Lifecycle::new(),
            pending_writes: Mutex::new(JoinSet::new()),
            last_install: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn cache_name(&self) -> &str {
        &self.settings.cache_name
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn last_install(&self) -> Option<InstallReport> {
        self.last_install.lock().ok().and_then(|guard| guard.clone())
    }

    /// Install handler: pre-cache the manifest.
    ///
    /// Only lifecycle violations are returned as errors; a failed batch is
    /// reported through [`InstallReport::error`].
    pub async fn install(&self) -> Result<InstallReport, Error> {
        self.lifecycle.transition(WorkerState::Installing)?;
        tracing::info!(cache_name = %self.settings.cache_name, "installing");

        let requested = self.settings.manifest.len();
        let report = match self.precache().await {
            Ok(cached) => {
                tracing::info!(cache_name = %self.settings.cache_name, cached, "all static assets cached");
                InstallReport {
                    cache_name: self.settings.cache_name.clone(),
                    requested,
                    cached,
                    error: None,
                    finished_at: chrono::Utc::now().to_rfc3339(),
                }
            }
            Err(e) => {
                tracing::error!(cache_name = %self.settings.cache_name, error = %e, "failed to cache static assets");
                InstallReport {
                    cache_name: self.settings.cache_name.clone(),
                    requested,
                    cached: 0,
                    error: Some(e.to_string()),
                    finished_at: chrono::Utc::now().to_rfc3339(),
                }
            }
        };

        if let Ok(mut slot) = self.last_install.lock() {
            *slot = Some(report.clone());
        }
        self.lifecycle.transition(WorkerState::Installed)?;
        Ok(report)
    }

    async fn precache(&self) -> Result<usize, Error> {
        let name = &self.settings.cache_name;
        self.store.open(name).await?;
        tracing::debug!(cache_name = %name, "opened cache");

        let requests = self
            .settings
            .manifest
            .assets()
            .iter()
            .map(|path| {
                resolve(&self.settings.scope, path)
                    .map(|url| Request::get(url.as_str()))
                    .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let responses = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;

        let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
        let count = entries.len();
        self.store
            .put_all(name, entries)
            .await
            .map_err(|e| Error::InstallFailed(e.to_string()))?;
        Ok(count)
    }

    async fn fetch_asset(&self, request: &Request) -> Result<Response, Error> {
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
        if !response.is_ok() {
            return Err(Error::InstallFailed(format!("{} returned status {}", request.url, response.status)));
        }
        Ok(response)
    }

    /// Activate handler: delete every store outside the whitelist.
    ///
    /// The worker reaches `Activated` even when a deletion fails; the failure
    /// is still returned so the host can log it.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        self.lifecycle.transition(WorkerState::Activating)?;
        tracing::info!(cache_name = %self.settings.cache_name, "activating");

        let cleanup = self.delete_stale_caches().await;
        self.lifecycle.transition(WorkerState::Activated)?;

        let deleted = cleanup?;
        tracing::info!(deleted = deleted.len(), "old caches cleaned up");
        Ok(deleted)
    }

    async fn delete_stale_caches(&self) -> Result<Vec<String>, Error> {
        let whitelist = self.settings.whitelist();
        let stale: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|name| !whitelist.contains(name))
            .collect();

        try_join_all(stale.iter().map(|name| async move {
            tracing::info!(cache_name = %name, "deleting old cache");
            self.store.delete(name).await
        }))
        .await?;

        Ok(stale)
    }

    /// Fetch handler: cache first, network fallback with read-through caching.
    pub async fn handle_fetch(&self, request: Request) -> Result<FetchOutcome, Error> {
        let state = self.lifecycle.state();
        if !state.can_intercept_fetch() {
            return Err(Error::InvalidState(format!("worker is {state}, not intercepting fetches")));
        }
        let url = canonicalize(&request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = Request { url: url.to_string(), ..request };

        match self.store.match_request(&self.settings.cache_name, &request).await {
            Ok(Some(response)) => {
                tracing::debug!(request = %request, "serving from cache");
                return Ok(FetchOutcome { response, source: FetchSource::Cache, stored: false });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(request = %request, error = %e, "error matching cache, trying network");
                let response = self.network.fetch(&request).await?;
                return Ok(FetchOutcome::network(response, false));
            }
        }

        tracing::debug!(request = %request, "fetching from network");
        let response = self.network.fetch(&request).await.inspect_err(|e| {
            tracing::error!(request = %request, error = %e, "fetch failed");
        })?;

        if response.status != 200 || response.response_type != ResponseType::Basic || !request.is_get() {
            return Ok(FetchOutcome::network(response, false));
        }

        self.store_in_background(request, response.clone());
        Ok(FetchOutcome::network(response, true))
    }

    fn store_in_background(&self, request: Request, response: Response) {
        let store = Arc::clone(&self.store);
        let name = self.settings.cache_name.clone();
        let task = async move {
            if let Err(e) = store.put(&name, &request, response).await {
                tracing::warn!(request = %request, error = %e, "failed to cache response");
            }
        };

        match self.pending_writes.lock() {
            Ok(mut pending) => {
                while let Some(joined) = pending.try_join_next() {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "cache write task aborted");
                    }
                }
                pending.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }

    /// Wait for every background cache write queued so far.
    pub async fn flush(&self) {
        let mut pending = match self.pending_writes.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "cache write task aborted");
            }
        }
    }

    /// Mark this version as superseded.
    pub fn retire(&self) -> Result<(), Error> {
        self.lifecycle.transition(WorkerState::Redundant)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vrcache_core::MemoryStore;

    pub const SCOPE: &str = "http://localhost:8080/video-reverser/";

    /// Network double serving canned responses and counting calls.
    #[derive(Default)]
    pub struct StubNetwork {
        responses: Mutex<HashMap<String, Response>>,
        calls: AtomicUsize,
    }

    impl StubNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, response: Response) {
            self.responses.lock().unwrap().insert(url.to_string(), response);
        }

        /// Same-origin 200 for a path under the scope.
        pub fn serve_asset(&self, path: &str, body: &str) {
            let url = format!("{SCOPE}{path}");
            self.serve(&url, Response::new(200, url.clone(), body.to_string()).with_status_text("OK"));
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for StubNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .ok_or_else(|| Error::Network(format!("offline: {}", request.url)))
        }
    }

    /// Store whose lookups and deletions fail; everything else goes to memory.
    pub struct FailingStore {
        inner: MemoryStore,
    }

    impl FailingStore {
        pub fn new() -> Self {
            Self { inner: MemoryStore::new() }
        }

        fn broken() -> Error {
            Error::Database(tokio_rusqlite::Error::ConnectionClosed)
        }
    }

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn open(&self, name: &str) -> Result<(), Error> {
            self.inner.open(name).await
        }

        async fn has(&self, name: &str) -> Result<bool, Error> {
            self.inner.has(name).await
        }

        async fn keys(&self) -> Result<Vec<String>, Error> {
            self.inner.keys().await
        }

        async fn delete(&self, _name: &str) -> Result<bool, Error> {
            Err(Self::broken())
        }

        async fn match_request(&self, _name: &str, _request: &Request) -> Result<Option<Response>, Error> {
            Err(Self::broken())
        }

        async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error> {
            self.inner.put(name, request, response).await
        }

        async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
            self.inner.put_all(name, entries).await
        }

        async fn entries(&self, name: &str) -> Result<Vec<Request>, Error> {
            self.inner.entries(name).await
        }
    }

    pub fn settings(cache_name: &str, assets: &[&str]) -> WorkerSettings {
        WorkerSettings {
            cache_name: cache_name.to_string(),
            scope: Url::parse(SCOPE).unwrap(),
            manifest: Manifest::new(assets.iter().map(|s| s.to_string()).collect()),
            claim_clients: true,
        }
    }

    pub fn url(path: &str) -> String {
        format!("{SCOPE}{path}")
    }
}
