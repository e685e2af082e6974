//! Core types and shared functionality for cachefirst.
//!
//! This crate provides:
//! - Named, versioned response stores with a SQLite backend
//! - Request/response values and client message types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod message;

pub use cache::{CacheDb, CacheStore, content_hash};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use exchange::{Request, Response};
pub use message::{ClientMessage, UpdateTier};

pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode, header};
pub use url::Url;
