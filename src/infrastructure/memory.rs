//! In-process adapters, used when no database is configured and in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::aggregates::{CheckoutSession, OrderCreationResponse, OrderDraft};
use crate::domain::ports::{CartStore, OrderGateway, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    sessions: RwLock<HashMap<String, CheckoutSession>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn load(&self, session_id: &str) -> Result<Option<CheckoutSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, expected: u64, session: &CheckoutSession) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let current = sessions.get(session_id).map_or(0, CheckoutSession::revision);
        if current != expected { return Ok(false); }
        let mut stored = session.clone();
        stored.take_events();
        sessions.insert(session_id.to_string(), stored);
        Ok(true)
    }
}

/// Accepts every order, or rejects every order with a fixed message.
#[derive(Debug, Default)]
pub struct InMemoryOrderGateway {
    orders: Mutex<Vec<(String, OrderDraft)>>,
    reject_with: Option<String>,
}

impl InMemoryOrderGateway {
    pub fn new() -> Self { Self::default() }

    pub fn rejecting(message: impl Into<String>) -> Self {
        Self { orders: Mutex::default(), reject_with: Some(message.into()) }
    }

    pub async fn orders(&self) -> Vec<(String, OrderDraft)> { self.orders.lock().await.clone() }
}

#[async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn create_order(&self, draft: &OrderDraft) -> OrderCreationResponse {
        if let Some(message) = &self.reject_with {
            return OrderCreationResponse::failed(message.clone());
        }
        let order_id = Uuid::now_v7().to_string();
        self.orders.lock().await.push((order_id.clone(), draft.clone()));
        OrderCreationResponse::created(order_id, "Order placed successfully")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CartItem;
    use crate::domain::value_objects::PlayerId;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_store_round_trip_drops_events() {
        let store = InMemoryCartStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        let mut session = CheckoutSession::new();
        session.add_item(CartItem::new("P1", "Gems", dec!(1.5), 3, PlayerId::new("p1").unwrap()), 1).unwrap();
        session.advance_revision();
        assert!(store.save("s1", 0, &session).await.unwrap());

        let mut loaded = store.load("s1").await.unwrap().unwrap();
        assert!(loaded.take_events().is_empty());
        assert_eq!(loaded.cart(), session.cart());
        assert_eq!(loaded.revision(), 1);
    }

    #[tokio::test]
    async fn test_store_rejects_stale_revision() {
        let store = InMemoryCartStore::new();
        let mut first = CheckoutSession::new();
        first.advance_revision();
        assert!(store.save("s1", 0, &first).await.unwrap());

        let mut stale = CheckoutSession::new();
        stale.advance_revision();
        assert!(!store.save("s1", 0, &stale).await.unwrap());
        assert_eq!(store.load("s1").await.unwrap().unwrap().id(), first.id());

        let mut next = first.clone();
        next.advance_revision();
        assert!(store.save("s1", 1, &next).await.unwrap());
    }
}
