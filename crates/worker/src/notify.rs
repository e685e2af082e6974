//! Fan-out of resource update messages to controlled window clients.

use crate::clients::{ClientRegistry, ClientType};
use cachefirst_client::{Body, normalize};
use cachefirst_core::{ClientMessage, Error, UpdateTier};
use std::sync::Arc;

/// Stateless broadcaster over the live client set.
#[derive(Clone)]
pub struct ClientNotifier {
    clients: Arc<ClientRegistry>,
}

impl ClientNotifier {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }

    /// Report `body` for `url` to every controlled window client.
    ///
    /// Never fails: a normalization failure, or any failed delivery, is
    /// turned into a `RESOURCE_UPDATED_ERROR` broadcast instead.
    pub async fn notify(&self, url: &str, tier: UpdateTier, body: Body) {
        let message = match normalize(&body) {
            Ok(normalized) => ClientMessage::updated(url, tier, normalized.payload, normalized.hash),
            Err(err) => {
                tracing::error!("failed to normalize {} body for {}: {}", tier, url, err);
                self.broadcast_error(url, tier, &err).await;
                return;
            }
        };

        let failures = self.broadcast(message).await;
        if failures.is_empty() {
            return;
        }

        let pruned = self.clients.prune().await;
        let err = Error::Delivery(failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "));
        tracing::error!("failed to notify clients about {} (pruned {}): {}", url, pruned, err);
        self.broadcast_error(url, tier, &err).await;
    }

    /// Deliver `message` to each client independently, collecting failures.
    async fn broadcast(&self, message: ClientMessage) -> Vec<Error> {
        let clients = self.clients.match_all(ClientType::Window).await;
        tracing::debug!("posting {} update for {} to {} clients", message.update_type(), message.url(), clients.len());

        clients
            .iter()
            .filter_map(|client| client.post_message(message.clone()).err())
            .collect()
    }

    async fn broadcast_error(&self, url: &str, tier: UpdateTier, err: &Error) {
        for failure in self.broadcast(ClientMessage::error(url, tier, err)).await {
            tracing::warn!("dropped error notification for {}: {}", url, failure);
        }
    }
}
