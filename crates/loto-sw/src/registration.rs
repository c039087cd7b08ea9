//! Worker registration: the page-side entry point.

use crate::config::CacheConfig;
use crate::network::{FetchRequest, FetchResponse, Network, NetworkError};
use crate::worker::{OfflineWorker, WorkerEvent, WorkerScope};
use crate::ServiceWorkerError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Holds the active worker of an origin and swaps in new versions.
///
/// A newly registered version installs, then activates at once (skip
/// waiting); the previous worker becomes redundant. If install fails the
/// previous worker keeps serving.
pub struct Registration {
    scope: WorkerScope,
    network: Arc<dyn Network>,
    active: Option<Arc<OfflineWorker>>,
}

impl Registration {
    pub fn new(network: Arc<dyn Network>) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (scope, rx) = WorkerScope::new();
        (Self::with_scope(scope, network), rx)
    }

    /// Register into an existing scope (caches left by earlier sessions).
    pub fn with_scope(scope: WorkerScope, network: Arc<dyn Network>) -> Self {
        Self {
            scope,
            network,
            active: None,
        }
    }

    pub fn scope(&self) -> &WorkerScope {
        &self.scope
    }

    pub fn active(&self) -> Option<&Arc<OfflineWorker>> {
        self.active.as_ref()
    }

    /// Install and activate a worker for `config`.
    ///
    /// Registering the version that is already active is a no-op.
    pub async fn register(
        &mut self,
        config: CacheConfig,
    ) -> Result<Arc<OfflineWorker>, ServiceWorkerError> {
        if let Some(active) = &self.active {
            if active.config() == &config {
                return Ok(Arc::clone(active));
            }
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            self.scope.clone(),
            Arc::clone(&self.network),
        ));

        if let Err(e) = worker.install().await {
            warn!(error = %e, "New worker failed to install, keeping current one");
            return Err(e);
        }
        worker.activate().await?;

        if let Some(old) = self.active.replace(Arc::clone(&worker)) {
            old.retire().await;
            info!(old = %old.config().version, new = %worker.config().version, "Worker replaced");
        }
        Ok(worker)
    }

    /// Route a page request through the active worker, or straight to the
    /// network when none is active.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        match &self.active {
            Some(worker) => worker.handle_fetch(request).await,
            None => self.network.fetch(request).await,
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
