//! Messages posted to controlled page clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which tier produced the response a message reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateTier {
    Cache,
    Network,
}

impl fmt::Display for UpdateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTier::Cache => write!(f, "cache"),
            UpdateTier::Network => write!(f, "network"),
        }
    }
}

/// A resource update notification.
///
/// Serializes as `{"type":"RESOURCE_UPDATED", "url", "updateType", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    ResourceUpdated {
        url: String,
        update_type: UpdateTier,
        body: String,
        hash: i32,
        /// Unix epoch milliseconds.
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    ResourceUpdatedError { url: String, update_type: UpdateTier, error: String, timestamp: i64 },
}

impl ClientMessage {
    pub fn updated(url: &str, update_type: UpdateTier, body: String, hash: i32) -> Self {
        ClientMessage::ResourceUpdated { url: url.to_string(), update_type, body, hash, timestamp: now_millis() }
    }

    pub fn error(url: &str, update_type: UpdateTier, error: impl fmt::Display) -> Self {
        ClientMessage::ResourceUpdatedError {
            url: url.to_string(),
            update_type,
            error: error.to_string(),
            timestamp: now_millis(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ClientMessage::ResourceUpdated { url, .. } | ClientMessage::ResourceUpdatedError { url, .. } => url,
        }
    }

    pub fn update_type(&self) -> UpdateTier {
        match self {
            ClientMessage::ResourceUpdated { update_type, .. }
            | ClientMessage::ResourceUpdatedError { update_type, .. } => *update_type,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ClientMessage::ResourceUpdatedError { .. })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
