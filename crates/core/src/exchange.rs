//! Request and response values passed between the interceptor, the store
//! and the network.
//!
//! Bodies are [`Bytes`], so cloning a response is cheap and a clone never
//! consumes or invalidates the original.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use url::Url;

use crate::Error;

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Request {
    /// A bodiless GET request for `url`.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new() }
    }

    /// URL as seen by observers, without fragment.
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }
}

/// A captured response: status, headers and the full body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Final URL after redirects, absent for synthesized responses.
    pub url: Option<Url>,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self { url: None, status, headers, body: body.into() }
    }

    /// A response with a single `content-type` header.
    pub fn with_content_type(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(content_type)
            .map_err(|e| Error::InvalidInput(format!("content-type {content_type:?}: {e}")))?;
        headers.insert(header::CONTENT_TYPE, value);
        Ok(Self::new(status, headers, body))
    }

    /// Placeholder returned when the network is unreachable and nothing is
    /// cached.
    pub fn network_error() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain;charset=UTF-8"));
        Self::new(StatusCode::REQUEST_TIMEOUT, headers, Bytes::from_static(b"Network error"))
    }

    /// Declared content type, empty when missing or not visible ASCII.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Flatten headers into ordered name/value pairs for persistence.
///
/// Values that are not valid UTF-8 are dropped.
pub fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

/// Rebuild a header map from persisted pairs.
pub fn headers_from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("header name {name:?}: {e}")))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| Error::InvalidInput(format!("header value {value:?}: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}
