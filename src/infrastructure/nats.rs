//! Event publishing over NATS.

use async_trait::async_trait;

use crate::domain::events::CheckoutEvent;
use crate::domain::ports::EventPublisher;

/// Publishes to `<prefix>.<event name>` with the session id in the payload.
#[derive(Clone, Debug)]
pub struct NatsEventPublisher {
    client: async_nats::Client,
    prefix: String,
}

impl NatsEventPublisher {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject(&self, event: &CheckoutEvent) -> String { format!("{}.{}", self.prefix, event.name()) }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, session_id: &str, event: &CheckoutEvent) {
        let payload = serde_json::json!({ "sessionId": session_id, "event": event });
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => { tracing::warn!(error = %e, "failed to encode checkout event"); return; }
        };
        if let Err(e) = self.client.publish(self.subject(event), bytes.into()).await {
            tracing::warn!(error = %e, event = event.name(), "failed to publish checkout event");
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, session_id: &str, event: &CheckoutEvent) {
        tracing::debug!(session = session_id, event = event.name(), "checkout event");
    }
}
