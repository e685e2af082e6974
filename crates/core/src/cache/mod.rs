//! SQLite-backed named stores of captured responses.
//!
//! This module provides the persistent side of the cache: a registry of
//! versioned stores, each holding request-keyed responses, with async access
//! via tokio-rusqlite. It supports:
//!
//! - Create-if-absent open, enumeration and deletion of named stores
//! - Per-request match and overwrite, plus all-or-nothing bulk insert
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod registry;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use hash::{compute_cache_key, content_hash};
pub use store::CacheStore;
