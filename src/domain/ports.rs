//! Collaborator interfaces the checkout core talks to.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{CheckoutSession, OrderCreationResponse, OrderDraft};
use crate::domain::events::CheckoutEvent;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt session data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("session {0} was changed by another request, please retry")]
    Conflict(String),
}

/// Creates orders. Transport failures are reported as unsuccessful responses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(&self, draft: &OrderDraft) -> OrderCreationResponse;
}

/// Persists checkout sessions between requests.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<CheckoutSession>, StoreError>;

    /// Stores `session` only if the stored revision still equals `expected`
    /// (0 for a session that was never saved). Returns `false` when another
    /// save got there first.
    async fn save(&self, session_id: &str, expected: u64, session: &CheckoutSession) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, session_id: &str, event: &CheckoutEvent);
}
