//! The process-wide worker service.
//!
//! One [`ServiceWorker`] is built at startup and shared by the host. It owns
//! the store database handle, the network fetcher, the client registry and
//! the tracker for detached background work, and dispatches the three
//! lifecycle events: install, activate and fetch.

use crate::clients::{ClientRegistry, ClientType};
use crate::notify::ClientNotifier;
use cachefirst_client::{Fetcher, resolve};
use cachefirst_core::{AppConfig, CacheDb, ClientMessage, ConfigError, Error, Request, Response, Url};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_util::task::TaskTracker;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Installing,
    Installed,
    Activating,
    Active,
    /// Install failed; this worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Events the runtime shim delivers to the worker.
#[derive(Debug)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
}

/// Result of handling one [`LifecycleEvent`].
#[derive(Debug)]
pub enum EventOutcome {
    Installed,
    Activated,
    Response(Response),
}

/// Deployment-specific settings.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Current versioned store name.
    pub cache_name: String,
    /// Base for relative request and precache URLs.
    pub origin: Url,
    /// URLs stored at install time, in order.
    pub precache: Vec<String>,
}

impl WorkerOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self { cache_name: config.cache_name.clone(), origin: config.origin_url()?, precache: config.precache_list()? })
    }
}

pub(crate) struct Inner {
    pub(crate) options: WorkerOptions,
    pub(crate) db: CacheDb,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) notifier: ClientNotifier,
    state: RwLock<WorkerState>,
    tasks: TaskTracker,
}

/// Cheaply clonable handle to the single worker instance.
#[derive(Clone)]
pub struct ServiceWorker {
    pub(crate) inner: Arc<Inner>,
}

impl ServiceWorker {
    pub fn new(options: WorkerOptions, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Self {
        let clients = Arc::new(ClientRegistry::new());
        let notifier = ClientNotifier::new(clients.clone());
        Self {
            inner: Arc::new(Inner {
                options,
                db,
                fetcher,
                clients,
                notifier,
                state: RwLock::new(WorkerState::Uninitialized),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Dispatch one lifecycle event.
    ///
    /// Fetch events always produce a response; only install and activate
    /// can fail.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<EventOutcome, Error> {
        match event {
            LifecycleEvent::Install => self.install().await.map(|_| EventOutcome::Installed),
            LifecycleEvent::Activate => self.activate().await.map(|_| EventOutcome::Activated),
            LifecycleEvent::Fetch(request) => Ok(EventOutcome::Response(self.fetch(request).await)),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.inner.state.read().await
    }

    pub fn cache_name(&self) -> &str {
        &self.inner.options.cache_name
    }

    pub fn db(&self) -> &CacheDb {
        &self.inner.db
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.clients
    }

    /// Register a page client. It is controlled right away if this worker
    /// is already active; otherwise it waits for the activation claim.
    pub async fn connect_client(&self, id: &str, kind: ClientType) -> mpsc::UnboundedReceiver<ClientMessage> {
        let controlled = self.state().await == WorkerState::Active;
        self.inner.clients.connect(id, kind, controlled).await
    }

    /// Resolve `input` against the configured origin.
    pub fn resolve_url(&self, input: &str) -> Result<Url, Error> {
        resolve(input, &self.inner.options.origin).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    /// Wait until every detached background task has finished.
    pub async fn settle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Run `task` detached from the caller.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.spawn(task);
    }

    /// Move from one of `from` to `to`, or fail with `INVALID_STATE`.
    pub(crate) async fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), Error> {
        let mut state = self.inner.state.write().await;
        if !from.contains(&*state) {
            return Err(Error::InvalidState {
                expected: from.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or "),
                actual: state.to_string(),
            });
        }
        tracing::debug!("worker state {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    pub(crate) async fn set_state(&self, to: WorkerState) {
        *self.inner.state.write().await = to;
    }
}
