//! Cache-first fetch interception.
//!
//! A hit is answered from the store straight away while a detached task
//! refreshes the entry from the network. A miss goes to the network and a
//! successful answer is stored for next time. Every path yields a response.
//!
//! Until activation the worker controls no page, so requests go straight to
//! the network without touching the store or notifying anyone.

use crate::service::{ServiceWorker, WorkerState};
use cachefirst_core::{CacheStore, Error, Request, Response, UpdateTier};

impl ServiceWorker {
    /// Answer `request`, cache first once active.
    pub async fn fetch(&self, request: Request) -> Response {
        let state = self.state().await;
        if state != WorkerState::Active {
            tracing::debug!("worker {}, passing {} through", state, request.url_str());
            return self.passthrough(&request).await;
        }

        let store = match self.db().open_store(self.cache_name()).await {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!("failed to open {}: {}", self.cache_name(), err);
                return self.fetch_and_store(None, request).await;
            }
        };

        match store.match_request(&request).await {
            Ok(Some(cached)) => {
                tracing::debug!("cache hit: {}", request.url_str());
                self.on_hit(store, request, &cached);
                cached
            }
            Ok(None) => {
                tracing::debug!("cache miss: {}", request.url_str());
                self.fetch_and_store(Some(store), request).await
            }
            Err(err) => {
                tracing::warn!("cache lookup failed for {}: {}", request.url_str(), err);
                self.fetch_and_store(Some(store), request).await
            }
        }
    }

    async fn passthrough(&self, request: &Request) -> Response {
        match self.inner.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("network fetch failed for {}: {}", request.url_str(), err);
                Response::network_error()
            }
        }
    }

    /// Report the cached copy and refresh it in the background.
    fn on_hit(&self, store: CacheStore, request: Request, cached: &Response) {
        let notifier = self.inner.notifier.clone();
        let url = request.url_str().to_string();
        let copy = cached.clone();
        self.spawn(async move {
            notifier.notify(&url, UpdateTier::Cache, copy.into()).await;
        });

        let worker = self.clone();
        self.spawn(async move {
            if let Err(err) = worker.revalidate(&store, &request).await {
                tracing::warn!("background update failed for {}: {}", request.url_str(), err);
            }
        });
    }

    async fn revalidate(&self, store: &CacheStore, request: &Request) -> Result<(), Error> {
        let fresh = self.inner.fetcher.fetch(request).await?;
        if !fresh.is_ok() {
            tracing::debug!("revalidation of {} returned {}, keeping cached copy", request.url_str(), fresh.status);
            return Ok(());
        }

        store.put(request, &fresh).await?;
        self.inner
            .notifier
            .notify(request.url_str(), UpdateTier::Network, fresh.into())
            .await;
        Ok(())
    }

    /// Miss path: go to the network, store and report a 200.
    async fn fetch_and_store(&self, store: Option<CacheStore>, request: Request) -> Response {
        let response = match self.inner.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("network fetch failed for {}: {}", request.url_str(), err);
                return Response::network_error();
            }
        };

        if !response.is_ok() {
            tracing::debug!("not caching {} ({})", request.url_str(), response.status);
            return response;
        }

        if let Some(store) = store {
            let copy = response.clone();
            let request = request.clone();
            self.spawn(async move {
                if let Err(err) = store.put(&request, &copy).await {
                    tracing::warn!("failed to cache {} in {}: {}", request.url_str(), store.name(), err);
                }
            });
        }

        let notifier = self.inner.notifier.clone();
        let url = request.url_str().to_string();
        let copy = response.clone();
        self.spawn(async move {
            notifier.notify(&url, UpdateTier::Network, copy.into()).await;
        });

        response
    }
}

#[cfg(test)]
mod tests {
    use crate::clients::ClientType;
    use crate::service::{ServiceWorker, WorkerState};
    use crate::testing::{ScriptedFetcher, status_response, test_worker, text_response};
    use cachefirst_core::{ClientMessage, Method, Request, UpdateTier, content_hash};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn active_worker(fetcher: Arc<ScriptedFetcher>) -> (ServiceWorker, mpsc::UnboundedReceiver<ClientMessage>) {
        let worker = test_worker(fetcher, &[]).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        let rx = worker.connect_client("page", ClientType::Window).await;
        (worker, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn request(worker: &ServiceWorker, path: &str) -> Request {
        Request::get(worker.resolve_url(path).unwrap())
    }

    #[tokio::test]
    async fn test_miss_stores_and_notifies_network() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/data.json", text_response("application/json", r#"{"x":1}"#));
        let (worker, mut rx) = active_worker(fetcher.clone()).await;
        let req = request(&worker, "/data.json");

        let response = worker.fetch(req.clone()).await;
        worker.settle().await;

        assert_eq!(response.status.as_u16(), 200);
        assert_eq!(response.text(), r#"{"x":1}"#);

        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert_eq!(store.match_request(&req).await.unwrap().unwrap().text(), r#"{"x":1}"#);

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ClientMessage::ResourceUpdated { url, update_type, body, hash, .. } => {
                assert_eq!(url, "https://app.test/data.json");
                assert_eq!(*update_type, UpdateTier::Network);
                assert_eq!(body, r#"{"x":1}"#);
                assert_eq!(*hash, content_hash(r#"{"x":1}"#));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hit_returns_cached_and_notifies_cache() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/app.js", text_response("application/javascript", "v1"));
        let (worker, mut rx) = active_worker(fetcher.clone()).await;
        let req = request(&worker, "/app.js");

        worker.fetch(req.clone()).await;
        worker.settle().await;
        drain(&mut rx);

        fetcher.respond("https://app.test/app.js", text_response("application/javascript", "v2"));
        let response = worker.fetch(req.clone()).await;
        assert_eq!(response.text(), "v1");

        worker.settle().await;
        let messages = drain(&mut rx);
        let tiers: Vec<UpdateTier> = messages.iter().map(|m| m.update_type()).collect();
        assert_eq!(tiers, vec![UpdateTier::Cache, UpdateTier::Network]);
        assert!(messages.iter().all(|m| !m.is_error()));

        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert_eq!(store.match_request(&req).await.unwrap().unwrap().text(), "v2");
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_hit_body_is_byte_identical() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        let png = status_response(200, "image/png", vec![0x89u8, b'P', 0x00, 0xff]);
        fetcher.respond("https://app.test/logo.png", png.clone());
        let (worker, _rx) = active_worker(fetcher).await;
        let req = request(&worker, "/logo.png");

        worker.fetch(req.clone()).await;
        worker.settle().await;

        let cached = worker.fetch(req).await;
        assert_eq!(cached.body, png.body);
        assert_eq!(cached.content_type(), "image/png");
    }

    #[tokio::test]
    async fn test_hit_with_failing_revalidation() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/app.js", text_response("application/javascript", "cached"));
        let (worker, mut rx) = active_worker(fetcher.clone()).await;
        let req = request(&worker, "/app.js");

        worker.fetch(req.clone()).await;
        worker.settle().await;
        drain(&mut rx);

        fetcher.fail("https://app.test/app.js", "offline");
        let response = worker.fetch(req.clone()).await;
        worker.settle().await;

        assert_eq!(response.text(), "cached");
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].update_type(), UpdateTier::Cache);
        assert!(!messages[0].is_error());

        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert_eq!(store.match_request(&req).await.unwrap().unwrap().text(), "cached");
    }

    #[tokio::test]
    async fn test_revalidation_ignores_non_ok() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/app.js", text_response("application/javascript", "cached"));
        let (worker, mut rx) = active_worker(fetcher.clone()).await;
        let req = request(&worker, "/app.js");
        worker.fetch(req.clone()).await;
        worker.settle().await;
        drain(&mut rx);

        fetcher.respond("https://app.test/app.js", status_response(500, "text/plain", "boom"));
        worker.fetch(req.clone()).await;
        worker.settle().await;

        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert_eq!(store.match_request(&req).await.unwrap().unwrap().text(), "cached");
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_miss_with_failing_fetch_is_408() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail("https://app.test/offline", "connection refused");
        let (worker, mut rx) = active_worker(fetcher).await;

        let response = worker.fetch(request(&worker, "/offline")).await;
        worker.settle().await;

        assert_eq!(response.status.as_u16(), 408);
        assert_eq!(response.text(), "Network error");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_non_ok_miss_is_not_stored() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/missing", status_response(404, "text/plain", "not found"));
        let (worker, mut rx) = active_worker(fetcher).await;
        let req = request(&worker, "/missing");

        let response = worker.fetch(req.clone()).await;
        worker.settle().await;

        assert_eq!(response.status.as_u16(), 404);
        assert_eq!(response.text(), "not found");
        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert!(store.match_request(&req).await.unwrap().is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_non_get_is_passed_through() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/api", text_response("application/json", "{}"));
        let (worker, _rx) = active_worker(fetcher).await;
        let mut req = request(&worker, "/api");
        req.method = Method::POST;

        let response = worker.fetch(req.clone()).await;
        worker.settle().await;

        assert_eq!(response.status.as_u16(), 200);
        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert!(store.urls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redundant_worker_only_passes_through() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.fail("https://app.test/a.js", "offline");
        fetcher.respond("https://app.test/x.js", text_response("application/javascript", "x"));
        let worker = test_worker(fetcher, &["/a.js"]).await;
        assert!(worker.install().await.is_err());
        let mut rx = worker.connect_client("page", ClientType::Window).await;
        worker.clients().claim().await;

        let response = worker.fetch(request(&worker, "/x.js")).await;
        worker.settle().await;

        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert_eq!(response.text(), "x");
        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert!(store.urls().await.unwrap().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_installed_worker_does_not_serve_precache() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/a.js", text_response("application/javascript", "precached"));
        let worker = test_worker(fetcher.clone(), &["/a.js"]).await;
        worker.install().await.unwrap();

        fetcher.respond("https://app.test/a.js", text_response("application/javascript", "live"));
        fetcher.respond("https://app.test/b.js", text_response("application/javascript", "b"));
        assert_eq!(worker.fetch(request(&worker, "/a.js")).await.text(), "live");
        worker.fetch(request(&worker, "/b.js")).await;
        worker.settle().await;

        let store = worker.db().open_store("test-cache-v1").await.unwrap();
        assert_eq!(store.urls().await.unwrap(), vec!["https://app.test/a.js"]);
        assert_eq!(store.match_request(&request(&worker, "/a.js")).await.unwrap().unwrap().text(), "precached");
    }

    #[tokio::test]
    async fn test_caller_does_not_wait_for_revalidation() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond("https://app.test/slow.css", text_response("text/css", "a{}"));
        let (worker, mut rx) = active_worker(fetcher.clone()).await;
        let req = request(&worker, "/slow.css");
        worker.fetch(req.clone()).await;
        worker.settle().await;
        drain(&mut rx);

        let gate = fetcher.gate("https://app.test/slow.css");
        fetcher.respond("https://app.test/slow.css", text_response("text/css", "b{}"));

        let response = worker.fetch(req.clone()).await;
        assert_eq!(response.text(), "a{}");

        gate.notify_one();
        worker.settle().await;
        let tiers: Vec<UpdateTier> = drain(&mut rx).iter().map(|m| m.update_type()).collect();
        assert_eq!(tiers, vec![UpdateTier::Cache, UpdateTier::Network]);
    }
}
