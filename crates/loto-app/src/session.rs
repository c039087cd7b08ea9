//! One app run: state, offline worker and UI selection.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::generator::{Generator, PredictionService};
use crate::state::AppState;
use crate::tab::Tab;
use loto_storage::{FileStore, KeyValueStore, MemoryStore, Storage};
use loto_sw::{
    FetchRequest, FetchResponse, HttpNetwork, Network, NetworkError, Registration, WorkerEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Everything a running app owns.
pub struct Session {
    storage: Storage,
    state: AppState,
    generator: Generator,
    registration: Registration,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    tab: Tab,
}

impl Session {
    /// Boot: open storage, hydrate state, register the offline worker and
    /// pick the initial tab from `query`.
    ///
    /// Worker registration failure is logged and otherwise ignored; the
    /// session then talks to the network directly.
    pub async fn start(config: &AppConfig, network: Arc<dyn Network>, query: Option<&str>) -> Self {
        let storage = open_storage(config).await;
        Self::with_storage(config, storage, network, query).await
    }

    /// Boot against the real network, with the configured timeout.
    pub async fn start_online(config: &AppConfig, query: Option<&str>) -> AppResult<Self> {
        let network = HttpNetwork::new(config.network_timeout())?;
        Ok(Self::start(config, Arc::new(network), query).await)
    }

    /// Boot on an already opened storage.
    pub async fn with_storage(
        config: &AppConfig,
        storage: Storage,
        network: Arc<dyn Network>,
        query: Option<&str>,
    ) -> Self {
        let state = AppState::load(&storage).await;

        let (mut registration, events) = Registration::new(network);
        match registration.register(config.cache.clone()).await {
            Ok(worker) => info!(version = %worker.config().version, "Offline worker active"),
            Err(e) => warn!(error = %e, "Offline worker registration failed"),
        }

        let tab = Tab::resolve(query);
        info!(tab = tab.slug(), "Session started");

        Self {
            storage,
            state,
            generator: Generator::new(),
            registration,
            events,
            tab,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
    }

    /// Run the generate action against `service`.
    pub async fn generate(&mut self, service: &dyn PredictionService) {
        self.generator.generate(&mut self.state, service).await;
    }

    /// Fetch through the offline worker.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        self.registration.fetch(request).await
    }

    /// Worker events received so far.
    pub fn drain_events(&mut self) -> Vec<WorkerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Wait for pending state writes, then drop the session.
    pub async fn shutdown(self) {
        self.storage.flush().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tab", &self.tab)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

/// Open the configured file store, or an in-memory one when that fails.
pub async fn open_storage(config: &AppConfig) -> Storage {
    let store: Arc<dyn KeyValueStore> = match config.resolved_storage_dir() {
        Some(dir) => match FileStore::open(&dir).await {
            Ok(store) => {
                info!(dir = %dir.display(), "Using file storage");
                Arc::new(store)
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "File storage unavailable, state will not survive restart");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("No storage directory, state will not survive restart");
            Arc::new(MemoryStore::new())
        }
    };
    Storage::new(store)
}
