//! cachefirst worker entry point.
//!
//! Boots the cache-first worker and serves lifecycle events as JSON lines on
//! stdio. Logging goes to stderr to keep stdout a clean protocol channel.

use anyhow::{Context, Result};
use cachefirst_client::{FetchConfig, HttpFetcher};
use cachefirst_core::{AppConfig, CacheDb};
use service::{ServiceWorker, WorkerOptions};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod clients;
mod error;
mod host;
mod intercept;
mod lifecycle;
mod notify;
mod service;
#[cfg(test)]
mod testing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let fetcher = HttpFetcher::new(FetchConfig::from(&config))?;
    let options = WorkerOptions::from_config(&config)?;

    tracing::info!(cache = %options.cache_name, origin = %options.origin, precache = options.precache.len(), "starting cachefirst worker on stdio");

    let worker = ServiceWorker::new(options, db, Arc::new(fetcher));
    host::run(worker, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    tracing::info!("input closed, worker stopped");
    Ok(())
}
