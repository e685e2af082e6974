//! Install and activate handlers.
//!
//! ### Install
//! - Opens (creates) the current store, then fetches every precache URL.
//! - Entries are written in one transaction only after every fetch came
//!   back OK, so a single failure leaves the store without any of them.
//! - A failed install marks the worker redundant.
//!
//! ### Activate
//! - Deletes every store whose name differs from the current one.
//! - Claims all connected clients so their traffic is intercepted without
//!   a reload.

use crate::service::{ServiceWorker, WorkerState};
use cachefirst_core::{Error, Request, Response};

impl ServiceWorker {
    /// Precache and move to `Installed`.
    ///
    /// Skips waiting: once installed the worker may be activated
    /// immediately.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(&[WorkerState::Uninitialized], WorkerState::Installing)
            .await?;
        tracing::info!("install event for {}", self.cache_name());

        match self.precache().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed).await;
                tracing::info!("precache completed ({} urls)", count);
                Ok(())
            }
            Err(err) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::warn!("install failed: {}", err);
                Err(err)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let store = self.db().open_store(self.cache_name()).await?;

        let mut entries: Vec<(Request, Response)> = Vec::with_capacity(self.inner.options.precache.len());
        for raw in &self.inner.options.precache {
            let failed = |reason: String| Error::PrecacheFailed { url: raw.clone(), reason };

            let url = self.resolve_url(raw).map_err(|e| failed(e.to_string()))?;
            let request = Request::get(url);
            let response = self
                .inner
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| failed(e.to_string()))?;

            if !response.status.is_success() {
                return Err(failed(format!("status {}", response.status.as_u16())));
            }
            entries.push((request, response));
        }

        store.put_all(&entries).await?;
        Ok(entries.len())
    }

    /// Prune stale stores, claim clients and move to `Active`.
    pub async fn activate(&self) -> Result<(), Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)
            .await?;
        tracing::info!("activate event for {}", self.cache_name());

        match self.prune_stale_stores().await {
            Ok(deleted) => {
                let claimed = self.inner.clients.claim().await;
                self.set_state(WorkerState::Active).await;
                tracing::info!("now controlling clients ({} claimed, {} old caches deleted)", claimed, deleted);
                Ok(())
            }
            Err(err) => {
                self.set_state(WorkerState::Installed).await;
                tracing::warn!("activate failed: {}", err);
                Err(err)
            }
        }
    }

    async fn prune_stale_stores(&self) -> Result<usize, Error> {
        let mut deleted = 0;
        for name in self.db().store_names().await? {
            if name == self.cache_name() {
                continue;
            }
            tracing::info!("deleting old cache: {}", name);
            if self.db().delete_store(&name).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
