//! Client code for cachefirst.
//!
//! This crate provides the network fetch pipeline and the payload
//! normalization used when reporting responses to controlled clients.

pub mod fetch;
pub mod payload;

pub use fetch::{FetchConfig, Fetcher, HttpFetcher, UrlError, resolve};
pub use payload::{Blob, Body, FormData, FormValue, Normalized, normalize};
