//! The offline worker: lifecycle and fetch routing.

use crate::cache::{CacheEntry, CacheStorage};
use crate::config::CacheConfig;
use crate::network::{FetchRequest, FetchResponse, Network, NetworkError};
use crate::ServiceWorkerError;
use futures::future::try_join_all;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

// ==================== Types ====================

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, not yet installed.
    #[default]
    Parsed,
    /// Pre-caching core assets.
    Installing,
    /// Core assets cached; ready to take over.
    Installed,
    /// Pruning stale caches.
    Activating,
    /// Intercepting fetches.
    Activated,
    /// Install failed or replaced by a newer worker.
    Redundant,
}

/// Notifications from workers to the page side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    StateChange {
        worker_id: WorkerId,
        new_state: WorkerState,
    },
    /// Stale cache buckets were deleted during activation.
    CachesPruned { deleted: Vec<String> },
    /// A client is now controlled by `worker_id`.
    ControllerChange { client_id: String, worker_id: WorkerId },
}

// ==================== Clients ====================

/// An open UI context.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Worker currently intercepting this client's requests.
    pub controller: Option<WorkerId>,
}

/// Open UI contexts of the origin.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    next_id: u64,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened page. It starts uncontrolled.
    pub fn open_window(&mut self, url: Url) -> String {
        self.next_id += 1;
        let id = format!("client-{}", self.next_id);
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                controller: None,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Make `worker` the controller of every client.
    ///
    /// Returns the ids whose controller changed, sorted.
    pub fn claim(&mut self, worker: WorkerId) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect();
        changed.sort_unstable();
        changed
    }

    /// Number of clients controlled by `worker`.
    pub fn controlled_by(&self, worker: WorkerId) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .count()
    }
}

// ==================== Scope ====================

/// Origin-wide resources shared by every worker version.
#[derive(Clone)]
pub struct WorkerScope {
    pub caches: Arc<RwLock<CacheStorage>>,
    pub clients: Arc<RwLock<Clients>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerScope {
    /// Create an empty scope and the receiving end of its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                caches: Arc::new(RwLock::new(CacheStorage::new())),
                clients: Arc::new(RwLock::new(Clients::new())),
                events,
            },
            rx,
        )
    }

    fn emit(&self, event: WorkerEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

// ==================== Routing ====================

/// How a fetch is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Network first, offline page on failure.
    Navigation,
    /// Current cache first, network on miss.
    CoreAsset,
    /// Network first, any cached copy on failure.
    NetworkFirst,
}

// ==================== OfflineWorker ====================

/// One version of the offline worker.
pub struct OfflineWorker {
    id: WorkerId,
    config: CacheConfig,
    state: RwLock<WorkerState>,
    scope: WorkerScope,
    network: Arc<dyn Network>,
}

impl OfflineWorker {
    /// Create a worker for `config` in `scope`.
    pub fn new(config: CacheConfig, scope: WorkerScope, network: Arc<dyn Network>) -> Self {
        Self {
            id: WorkerId::new(),
            config,
            state: RwLock::new(WorkerState::Parsed),
            scope,
            network,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, new_state: WorkerState) {
        *self.state.write().await = new_state;
        self.scope.emit(WorkerEvent::StateChange {
            worker_id: self.id,
            new_state,
        });
    }

    /// Pre-cache every core asset into the current bucket.
    ///
    /// All or nothing: entries are stored only once every asset fetched with
    /// a 2xx status. On failure the worker becomes redundant; calling
    /// `install` again retries.
    pub async fn install(&self) -> Result<(), ServiceWorkerError> {
        {
            let mut state = self.state.write().await;
            match *state {
                WorkerState::Parsed | WorkerState::Redundant => *state = WorkerState::Installing,
                other => {
                    return Err(ServiceWorkerError::State(format!(
                        "cannot install from {other:?}"
                    )))
                }
            }
        }
        self.scope.emit(WorkerEvent::StateChange {
            worker_id: self.id,
            new_state: WorkerState::Installing,
        });

        let version = self.config.version.as_str();
        info!(worker = ?self.id, %version, assets = self.config.core_assets.len(), "Installing");

        let entries = match self.precache().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(worker = ?self.id, %version, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                return Err(e);
            }
        };

        {
            let mut caches = self.scope.caches.write().await;
            let cache = caches.open(version);
            for entry in entries {
                cache.put(entry);
            }
        }

        // Skip waiting: ready to take over without waiting for old clients.
        self.set_state(WorkerState::Installed).await;
        info!(worker = ?self.id, %version, "Installed");
        Ok(())
    }

    async fn precache(&self) -> Result<Vec<CacheEntry>, ServiceWorkerError> {
        self.config.validate()?;
        let urls = self.config.core_urls()?;

        // The bucket exists from here on, populated or not.
        self.scope.caches.write().await.open(self.config.version.as_str());

        try_join_all(urls.into_iter().map(|url| self.fetch_core_asset(url))).await
    }

    async fn fetch_core_asset(&self, url: Url) -> Result<CacheEntry, ServiceWorkerError> {
        let request = FetchRequest::get(url);
        let response = self.network.fetch(&request).await.map_err(|e| {
            ServiceWorkerError::InstallFailed {
                url: request.url.to_string(),
                reason: e.to_string(),
            }
        })?;

        if !response.ok() {
            return Err(ServiceWorkerError::InstallFailed {
                url: request.url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }

        debug!(url = %request.url, bytes = response.body.len(), "Pre-cached");
        Ok(CacheEntry::from_response(&request, &response))
    }

    /// Delete stale buckets and claim every client.
    ///
    /// Returns the names of the deleted buckets. Calling it again on an
    /// activated worker is a no-op that deletes nothing current.
    pub async fn activate(&self) -> Result<Vec<String>, ServiceWorkerError> {
        {
            let mut state = self.state.write().await;
            match *state {
                WorkerState::Installed => *state = WorkerState::Activating,
                WorkerState::Activated => {}
                other => {
                    return Err(ServiceWorkerError::State(format!(
                        "cannot activate from {other:?}"
                    )))
                }
            }
        }

        let current = self.config.version.as_str();
        let deleted: Vec<String> = {
            let mut caches = self.scope.caches.write().await;
            let stale: Vec<String> = caches
                .keys()
                .into_iter()
                .filter(|name| *name != current)
                .map(str::to_string)
                .collect();
            for name in &stale {
                caches.delete(name);
            }
            stale
        };

        if !deleted.is_empty() {
            info!(worker = ?self.id, ?deleted, "Pruned stale caches");
            self.scope.emit(WorkerEvent::CachesPruned {
                deleted: deleted.clone(),
            });
        }

        let claimed = self.scope.clients.write().await.claim(self.id);
        for client_id in claimed {
            self.scope.emit(WorkerEvent::ControllerChange {
                client_id,
                worker_id: self.id,
            });
        }

        if self.state().await != WorkerState::Activated {
            self.set_state(WorkerState::Activated).await;
            info!(worker = ?self.id, version = %current, "Activated");
        }
        Ok(deleted)
    }

    /// Install and activate in one step.
    pub async fn start(&self) -> Result<(), ServiceWorkerError> {
        self.install().await?;
        self.activate().await?;
        Ok(())
    }

    /// Mark this worker as replaced.
    pub async fn retire(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    /// Classify a request.
    pub fn route(&self, request: &FetchRequest) -> Route {
        if request.is_navigation() {
            Route::Navigation
        } else if self.config.is_core_asset(&request.url) {
            Route::CoreAsset
        } else {
            Route::NetworkFirst
        }
    }

    /// Answer an intercepted request.
    ///
    /// Until activation every request goes straight to the network. A
    /// failure with no cached fallback returns the network error unchanged.
    pub async fn handle_fetch(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, NetworkError> {
        if self.state().await != WorkerState::Activated {
            return self.network.fetch(request).await;
        }

        let route = self.route(request);
        debug!(url = %request.url, ?route, "Intercepted fetch");

        match route {
            Route::Navigation => match self.network.fetch(request).await {
                Ok(response) => Ok(response),
                Err(e) => match self.offline_page().await {
                    Some(page) => {
                        debug!(url = %request.url, error = %e, "Serving offline page");
                        Ok(page)
                    }
                    None => Err(e),
                },
            },
            Route::CoreAsset => {
                let cached = {
                    let caches = self.scope.caches.read().await;
                    caches
                        .get(self.config.version.as_str())
                        .and_then(|cache| cache.match_request(request))
                        .and_then(CacheEntry::to_response)
                };
                match cached {
                    Some(response) => Ok(response),
                    None => self.network.fetch(request).await,
                }
            }
            Route::NetworkFirst => match self.network.fetch(request).await {
                Ok(response) => Ok(response),
                Err(e) => {
                    let cached = self
                        .scope
                        .caches
                        .read()
                        .await
                        .match_request(request)
                        .and_then(CacheEntry::to_response);
                    cached.ok_or(e)
                }
            },
        }
    }

    async fn offline_page(&self) -> Option<FetchResponse> {
        let url = self.config.offline_url().ok()?;
        self.scope
            .caches
            .read()
            .await
            .match_url(&url)
            .and_then(CacheEntry::to_response)
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("id", &self.id)
            .field("version", &self.config.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::StatusCode;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// Serves `/path` → body from a table; can be switched offline.
    struct FakeNetwork {
        pages: Mutex<HashMap<String, (StatusCode, String)>>,
        online: AtomicBool,
        calls: AtomicU64,
    }

    impl FakeNetwork {
        fn new(pages: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(
                    pages
                        .iter()
                        .map(|(p, b)| (p.to_string(), (StatusCode::OK, b.to_string())))
                        .collect(),
                ),
                online: AtomicBool::new(true),
                calls: AtomicU64::new(0),
            })
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn set_page(&self, path: &str, status: StatusCode, body: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body.to_string()));
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.online.load(Ordering::SeqCst) {
                return Err(NetworkError::Offline("fake network down".to_string()));
            }
            let pages = self.pages.lock().unwrap();
            let (status, body) = pages
                .get(request.url.path())
                .cloned()
                .unwrap_or((StatusCode::NOT_FOUND, String::new()));
            Ok(FetchResponse::new(request.url.clone(), status, body))
        }
    }

    fn origin() -> Url {
        Url::parse("https://loto.example/").unwrap()
    }

    fn config(version: &str) -> CacheConfig {
        CacheConfig::new(version, origin()).with_core_assets(["/", "/offline.html"])
    }

    fn site() -> Arc<FakeNetwork> {
        FakeNetwork::new(&[
            ("/", "<html>home</html>"),
            ("/offline.html", "<html>offline</html>"),
            ("/app.js", "console.log(1)"),
        ])
    }

    #[tokio::test]
    async fn test_install_populates_current_bucket() {
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope.clone(), site());

        worker.install().await.unwrap();

        assert_eq!(worker.state().await, WorkerState::Installed);
        let caches = scope.caches.read().await;
        let bucket = caches.get("v1").unwrap();
        assert_eq!(
            bucket.keys(),
            vec!["https://loto.example/", "https://loto.example/offline.html"]
        );
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let network = site();
        network.set_page("/offline.html", StatusCode::INTERNAL_SERVER_ERROR, "");
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope.clone(), network.clone());

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, ServiceWorkerError::InstallFailed { ref url, .. } if url.ends_with("/offline.html")));
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert!(scope.caches.read().await.get("v1").unwrap().is_empty());

        // Activation must not treat the bucket as complete.
        assert!(worker.activate().await.is_err());

        // A later attempt retries.
        network.set_page("/offline.html", StatusCode::OK, "<html>offline</html>");
        worker.install().await.unwrap();
        assert_eq!(scope.caches.read().await.get("v1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_install_fails_when_offline() {
        let network = site();
        network.set_online(false);
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope, network);

        assert!(matches!(
            worker.install().await,
            Err(ServiceWorkerError::InstallFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_prunes_other_versions() {
        let (scope, _rx) = WorkerScope::new();
        scope.caches.write().await.open("v1");
        let worker = OfflineWorker::new(config("v2"), scope.clone(), site());

        worker.install().await.unwrap();
        let deleted = worker.activate().await.unwrap();

        assert_eq!(deleted, vec!["v1".to_string()]);
        assert_eq!(scope.caches.read().await.keys(), vec!["v2"]);
    }

    #[tokio::test]
    async fn test_activate_twice_keeps_current_bucket() {
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope.clone(), site());
        worker.start().await.unwrap();

        assert!(worker.activate().await.unwrap().is_empty());
        assert!(worker.activate().await.unwrap().is_empty());

        let caches = scope.caches.read().await;
        assert_eq!(caches.keys(), vec!["v1"]);
        assert_eq!(caches.get("v1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_activate_before_install_fails() {
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope, site());
        assert!(matches!(
            worker.activate().await,
            Err(ServiceWorkerError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let (scope, mut rx) = WorkerScope::new();
        let client_id = scope.clients.write().await.open_window(origin());
        let worker = OfflineWorker::new(config("v1"), scope.clone(), site());

        worker.start().await.unwrap();

        {
            let clients = scope.clients.read().await;
            assert_eq!(clients.controlled_by(worker.id()), 1);
            assert_eq!(clients.get(&client_id).unwrap().controller, Some(worker.id()));
        }

        let mut saw_controller_change = false;
        while let Ok(event) = rx.try_recv() {
            if let WorkerEvent::ControllerChange { client_id: id, worker_id } = event {
                assert_eq!(id, client_id);
                assert_eq!(worker_id, worker.id());
                saw_controller_change = true;
            }
        }
        assert!(saw_controller_change);
    }

    #[tokio::test]
    async fn test_navigation_prefers_network() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope, network.clone());
        worker.start().await.unwrap();

        network.set_page("/", StatusCode::OK, "<html>fresh</html>");
        let response = worker
            .handle_fetch(&FetchRequest::navigate(origin()))
            .await
            .unwrap();

        assert!(!response.from_cache());
        assert_eq!(response.text(), "<html>fresh</html>");
    }

    #[tokio::test]
    async fn test_navigation_offline_serves_offline_page() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope, network.clone());
        worker.start().await.unwrap();

        network.set_online(false);
        let url = origin().join("/istoric").unwrap();
        let response = worker
            .handle_fetch(&FetchRequest::navigate(url))
            .await
            .unwrap();

        assert!(response.from_cache());
        assert_eq!(response.text(), "<html>offline</html>");
    }

    #[tokio::test]
    async fn test_core_asset_is_cache_first() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope, network.clone());
        worker.start().await.unwrap();
        let before = network.calls();

        network.set_page("/offline.html", StatusCode::OK, "<html>changed</html>");
        let url = origin().join("/offline.html").unwrap();
        let response = worker.handle_fetch(&FetchRequest::get(url)).await.unwrap();

        assert!(response.from_cache());
        assert_eq!(response.text(), "<html>offline</html>");
        assert_eq!(network.calls(), before);
    }

    #[tokio::test]
    async fn test_core_asset_miss_goes_to_network_without_caching() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope.clone(), network.clone());
        worker.start().await.unwrap();

        let url = origin().join("/offline.html").unwrap();
        scope.caches.write().await.open("v1").delete(&url);

        let response = worker.handle_fetch(&FetchRequest::get(url.clone())).await.unwrap();
        assert!(!response.from_cache());
        assert!(scope.caches.read().await.get("v1").unwrap().match_url(&url).is_none());
    }

    #[tokio::test]
    async fn test_other_requests_fall_back_to_cache() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope.clone(), network.clone());
        worker.start().await.unwrap();

        let url = origin().join("/app.js").unwrap();
        let request = FetchRequest::get(url.clone());
        let online = worker.handle_fetch(&request).await.unwrap();
        scope
            .caches
            .write()
            .await
            .open("v1")
            .put(CacheEntry::from_response(&request, &online));

        network.set_online(false);
        let offline = worker.handle_fetch(&request).await.unwrap();
        assert!(offline.from_cache());
        assert_eq!(offline.text(), "console.log(1)");
    }

    #[tokio::test]
    async fn test_uncached_request_offline_propagates_error() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope, network.clone());
        worker.start().await.unwrap();

        network.set_online(false);
        let url = origin().join("/api/draws").unwrap();
        let err = worker.handle_fetch(&FetchRequest::get(url)).await.unwrap_err();
        assert!(matches!(err, NetworkError::Offline(_)));
    }

    #[tokio::test]
    async fn test_inactive_worker_passes_through() {
        let (scope, _rx) = WorkerScope::new();
        let network = site();
        let worker = OfflineWorker::new(config("v1"), scope, network.clone());
        worker.install().await.unwrap();

        network.set_online(false);
        let result = worker.handle_fetch(&FetchRequest::navigate(origin())).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_route_classification() {
        let (scope, _rx) = WorkerScope::new();
        let worker = OfflineWorker::new(config("v1"), scope, site());

        let nav = FetchRequest::navigate(origin().join("/offline.html").unwrap());
        let core = FetchRequest::get(origin().join("/offline.html").unwrap());
        let other = FetchRequest::get(origin().join("/app.js").unwrap());

        assert_eq!(worker.route(&nav), Route::Navigation);
        assert_eq!(worker.route(&core), Route::CoreAsset);
        assert_eq!(worker.route(&other), Route::NetworkFirst);
    }
}
