//! PostgreSQL adapters: one JSONB row per session, one JSONB row per order.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{CheckoutSession, OrderCreationResponse, OrderDraft};
use crate::domain::ports::{CartStore, OrderGateway, StoreError};

#[derive(Clone, Debug)]
pub struct PgCartStore { pool: PgPool }

impl PgCartStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn load(&self, session_id: &str) -> Result<Option<CheckoutSession>, StoreError> {
        let state: Option<serde_json::Value> = sqlx::query_scalar("SELECT state FROM checkout_sessions WHERE session_id = $1")
            .bind(session_id).fetch_optional(&self.pool).await?;
        Ok(state.map(serde_json::from_value::<CheckoutSession>).transpose()?)
    }

    async fn save(&self, session_id: &str, expected: u64, session: &CheckoutSession) -> Result<bool, StoreError> {
        let expected = i64::try_from(expected).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "INSERT INTO checkout_sessions (session_id, state, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (session_id) DO UPDATE SET state = EXCLUDED.state, updated_at = NOW() \
             WHERE COALESCE((checkout_sessions.state->>'revision')::BIGINT, 0) = $3",
        )
            .bind(session_id).bind(serde_json::to_value(session)?).bind(expected)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone, Debug)]
pub struct PgOrderGateway { pool: PgPool }

impl PgOrderGateway {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl OrderGateway for PgOrderGateway {
    async fn create_order(&self, draft: &OrderDraft) -> OrderCreationResponse {
        let payload = match serde_json::to_value(draft) {
            Ok(payload) => payload,
            Err(e) => return OrderCreationResponse::failed(format!("Failed to encode order: {e}")),
        };
        let id = Uuid::now_v7();
        let result = sqlx::query("INSERT INTO orders (id, draft, total_price, created_at) VALUES ($1, $2, $3, NOW())")
            .bind(id).bind(payload).bind(draft.totals().total_price)
            .execute(&self.pool).await;
        match result {
            Ok(_) => OrderCreationResponse::created(id.to_string(), "Order placed successfully"),
            Err(e) => {
                tracing::error!(error = %e, "failed to insert order");
                OrderCreationResponse::failed("Order could not be saved, please try again")
            }
        }
    }
}
