//! Test fakes shared by the worker's unit tests.

use crate::service::{ServiceWorker, WorkerOptions};
use async_trait::async_trait;
use cachefirst_client::Fetcher;
use cachefirst_core::{Bytes, CacheDb, Error, Request, Response, StatusCode, Url};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
enum Scripted {
    Respond(Response),
    Fail(String),
}

/// A [`Fetcher`] answering from a per-URL script.
///
/// Unscripted URLs fail with `NETWORK_ERROR`. A gated URL blocks until the
/// gate is notified.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Respond(response));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Fail(reason.to_string()));
    }

    /// Hold every later fetch of `url` until the returned gate is notified.
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(url.to_string(), gate.clone());
        gate
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url_str().to_string();
        self.calls.lock().unwrap().push(url.clone());

        let gate = self.gates.lock().unwrap().remove(&url);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.routes.lock().unwrap().get(&url).cloned();
        match scripted {
            Some(Scripted::Respond(mut response)) => {
                response.url = Some(request.url.clone());
                Ok(response)
            }
            Some(Scripted::Fail(reason)) => Err(Error::Network(reason)),
            None => Err(Error::Network(format!("no route for {url}"))),
        }
    }
}

pub fn status_response(status: u16, content_type: &str, body: impl Into<Bytes>) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    Response::with_content_type(status, content_type, body).unwrap()
}

pub fn text_response(content_type: &str, body: &str) -> Response {
    status_response(200, content_type, body.to_string())
}

/// A worker over an in-memory database, cache `test-cache-v1` and origin
/// `https://app.test/`.
pub async fn test_worker(fetcher: Arc<ScriptedFetcher>, precache: &[&str]) -> ServiceWorker {
    let db = CacheDb::open_in_memory().await.unwrap();
    let options = WorkerOptions {
        cache_name: "test-cache-v1".to_string(),
        origin: Url::parse("https://app.test/").unwrap(),
        precache: precache.iter().map(|s| s.to_string()).collect(),
    };
    ServiceWorker::new(options, db, fetcher)
}
