//! Registry of connected page clients.
//!
//! Each client owns the receiving half of an unbounded channel; the worker
//! keeps the sending half. A client is *controlled* once the active worker
//! has claimed it (or it connected while a worker was active), and only
//! controlled clients are returned by [`ClientRegistry::match_all`].

use cachefirst_core::{ClientMessage, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};

/// Kind of execution context behind a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Window,
    Worker,
    Sharedworker,
}

struct ClientEntry {
    kind: ClientType,
    controlled: bool,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

/// A snapshot handle used to post one message to one client.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: String,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

impl ClientHandle {
    /// Deliver `message`. Fails only if the client has gone away.
    pub fn post_message(&self, message: ClientMessage) -> Result<(), Error> {
        self.sender
            .send(message)
            .map_err(|_| Error::Delivery(format!("client {} disconnected", self.id)))
    }
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous one with the same id.
    pub async fn connect(
        &self, id: &str, kind: ClientType, controlled: bool,
    ) -> mpsc::UnboundedReceiver<ClientMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut clients = self.clients.write().await;
        if clients.insert(id.to_string(), ClientEntry { kind, controlled, sender }).is_some() {
            tracing::debug!("client {} reconnected", id);
        }
        receiver
    }

    pub async fn disconnect(&self, id: &str) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Take control of every connected client. Returns how many were newly
    /// claimed.
    pub async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for entry in clients.values_mut().filter(|entry| !entry.controlled) {
            entry.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Controlled clients of `kind`, queried fresh on every call.
    ///
    /// A client that went away stays listed until [`prune`](Self::prune);
    /// posting to it fails with `DELIVERY_FAILED`.
    pub async fn match_all(&self, kind: ClientType) -> Vec<ClientHandle> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.controlled && entry.kind == kind)
            .map(|(id, entry)| ClientHandle { id: id.clone(), sender: entry.sender.clone() })
            .collect()
    }

    /// Drop clients whose receivers are gone.
    pub async fn prune(&self) -> usize {
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|_, entry| !entry.sender.is_closed());
        before - clients.len()
    }

    /// Forget every client, closing their channels.
    pub async fn clear(&self) {
        self.clients.write().await.clear();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachefirst_core::UpdateTier;

    fn message() -> ClientMessage {
        ClientMessage::updated("https://example.com/", UpdateTier::Cache, String::new(), 0)
    }

    #[tokio::test]
    async fn test_match_all_only_controlled_windows() {
        let registry = ClientRegistry::new();
        let _a = registry.connect("a", ClientType::Window, true).await;
        let _b = registry.connect("b", ClientType::Window, false).await;
        let _c = registry.connect("c", ClientType::Worker, true).await;

        let matched = registry.match_all(ClientType::Window).await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a");
    }

    #[tokio::test]
    async fn test_claim_controls_everyone() {
        let registry = ClientRegistry::new();
        let _a = registry.connect("a", ClientType::Window, true).await;
        let _b = registry.connect("b", ClientType::Window, false).await;

        assert_eq!(registry.claim().await, 1);
        assert_eq!(registry.match_all(ClientType::Window).await.len(), 2);
        assert_eq!(registry.claim().await, 0);
    }

    #[tokio::test]
    async fn test_post_message_delivers() {
        let registry = ClientRegistry::new();
        let mut rx = registry.connect("a", ClientType::Window, true).await;

        let handle = registry.match_all(ClientType::Window).await.remove(0);
        handle.post_message(message()).unwrap();

        assert_eq!(rx.recv().await.unwrap(), message());
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_delivery_and_prunes() {
        let registry = ClientRegistry::new();
        let rx = registry.connect("gone", ClientType::Window, true).await;
        let handle = registry.match_all(ClientType::Window).await.remove(0);
        drop(rx);

        assert!(matches!(handle.post_message(message()), Err(Error::Delivery(_))));
        assert_eq!(registry.match_all(ClientType::Window).await.len(), 1);
        assert_eq!(registry.prune().await, 1);
        assert_eq!(registry.len().await, 0);
        assert!(registry.match_all(ClientType::Window).await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let registry = ClientRegistry::new();
        let _rx = registry.connect("a", ClientType::Window, true).await;
        assert!(registry.disconnect("a").await);
        assert!(!registry.disconnect("a").await);
    }
}
