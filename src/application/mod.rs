//! Checkout service: loads a session, applies one operation, saves it back
//! and publishes the resulting events.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::aggregates::{CartError, CartItem, CheckoutError, CheckoutSession, OrderCreationResponse, OrderDraft, PlacedOrder, ShippingAddress};
use crate::domain::ports::{CartStore, EventPublisher, OrderGateway, StoreError};
use crate::domain::settings::SiteSettings;
use crate::domain::value_objects::PlayerId;
use crate::Result;

/// Product line as submitted by the storefront's add-to-cart form.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    pub product_ref: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: Decimal,
    pub count_in_stock: u32,
    #[serde(default)]
    pub image_ref: String,
    pub size: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub player_id: String,
}

impl NewCartItem {
    pub fn into_cart_item(self) -> std::result::Result<CartItem, CartError> {
        let player_id = PlayerId::new(self.player_id)?;
        let mut item = CartItem::new(self.product_ref, self.name, self.unit_price, self.count_in_stock, player_id)
            .with_variant(self.size, self.color);
        item.slug = self.slug;
        item.category = self.category;
        item.image_ref = self.image_ref;
        Ok(item)
    }
}

const MAX_SAVE_ATTEMPTS: usize = 3;
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct CheckoutService {
    settings: Arc<SiteSettings>,
    store: Arc<dyn CartStore>,
    orders: Arc<dyn OrderGateway>,
    events: Arc<dyn EventPublisher>,
    submit_timeout: Duration,
}

impl CheckoutService {
    pub fn new(settings: Arc<SiteSettings>, store: Arc<dyn CartStore>, orders: Arc<dyn OrderGateway>, events: Arc<dyn EventPublisher>) -> Self {
        Self { settings, store, orders, events, submit_timeout: DEFAULT_SUBMIT_TIMEOUT }
    }

    /// Caps how long the order gateway may take before the submission counts as failed.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &SiteSettings { &self.settings }

    /// An in-flight submission older than this is treated as abandoned.
    fn submission_lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.submit_timeout * 2).unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    /// Current session, or a fresh one if the id is unknown.
    pub async fn session(&self, session_id: &str) -> Result<CheckoutSession> {
        let mut session = self.store.load(session_id).await?.unwrap_or_default();
        if session.recover_stale_submission(Utc::now(), self.submission_lease()) {
            tracing::warn!(session = session_id, "abandoned order submission released");
        }
        Ok(session)
    }

    pub async fn add_item(&self, session_id: &str, item: NewCartItem, quantity: u32) -> Result<CheckoutSession> {
        let item = item.into_cart_item()?;
        self.apply(session_id, |s, _| s.add_item(item.clone(), quantity).map(drop)).await
    }

    pub async fn update_quantity(&self, session_id: &str, client_id: Uuid, quantity: u32) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| {
            let identity = s.cart().find_by_client_id(client_id).ok_or(CartError::ItemNotFound)?.identity();
            s.update_quantity(&identity, quantity).map(drop)
        }).await
    }

    pub async fn remove_item(&self, session_id: &str, client_id: Uuid) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| {
            let identity = s.cart().find_by_client_id(client_id).ok_or(CartError::ItemNotFound)?.identity();
            s.remove_item(&identity).map(drop)
        }).await
    }

    pub async fn set_currency(&self, session_id: &str, code: &str) -> Result<CheckoutSession> {
        self.apply(session_id, |s, settings| s.set_currency(settings, code)).await
    }

    pub async fn confirm_address(&self, session_id: &str, address: ShippingAddress) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| s.confirm_address(address.clone())).await
    }

    pub async fn edit_address(&self, session_id: &str) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| s.edit_address()).await
    }

    pub async fn confirm_payment(&self, session_id: &str, method: &str) -> Result<CheckoutSession> {
        self.apply(session_id, |s, settings| s.confirm_payment(settings, method)).await
    }

    pub async fn edit_payment(&self, session_id: &str) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| s.edit_payment()).await
    }

    pub async fn confirm_delivery(&self, session_id: &str, index: usize) -> Result<CheckoutSession> {
        self.apply(session_id, |s, settings| s.confirm_delivery(settings, index)).await
    }

    pub async fn edit_delivery(&self, session_id: &str) -> Result<CheckoutSession> {
        self.apply(session_id, |s, _| s.edit_delivery()).await
    }

    /// Places the order.
    ///
    /// Entering `Submitting` is a revision-checked save, so of two racing
    /// submits only one reaches the gateway. The gateway call and the final
    /// save run on their own task: a dropped request still settles the
    /// session, and a gateway that never answers is cut off after the submit
    /// timeout.
    pub async fn submit(&self, session_id: &str) -> Result<PlacedOrder> {
        let (session, draft) = self.claim_submission(session_id).await?;
        let service = self.clone();
        let id = session_id.to_string();
        match tokio::spawn(async move { service.finish_submission(&id, session, draft).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session = session_id, error = %e, "order submission task failed");
                Err(CheckoutError::SubmissionFailed("Order submission was interrupted, please try again".into()).into())
            }
        }
    }

    async fn claim_submission(&self, session_id: &str) -> Result<(CheckoutSession, OrderDraft)> {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let mut session = self.session(session_id).await?;
            let expected = session.revision();
            let draft = session.begin_submit(&self.settings, Utc::now())?;
            session.advance_revision();
            if self.store.save(session_id, expected, &session).await? {
                return Ok((session, draft));
            }
            tracing::debug!(session = session_id, "submission lost a race, reloading");
        }
        Err(StoreError::Conflict(session_id.to_string()).into())
    }

    async fn finish_submission(&self, session_id: &str, mut session: CheckoutSession, draft: OrderDraft) -> Result<PlacedOrder> {
        let total = draft.totals().total_price;
        tracing::info!(session = session_id, %total, items = draft.items().len(), "submitting order");
        let response = match tokio::time::timeout(self.submit_timeout, self.orders.create_order(&draft)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(session = session_id, timeout = ?self.submit_timeout, "order gateway timed out");
                OrderCreationResponse::failed("The order service did not respond in time, please try again")
            }
        };
        let outcome = session.complete_submit(total, response);

        // The gateway has answered; its outcome stands even if recording it fails.
        let expected = session.revision();
        session.advance_revision();
        match self.store.save(session_id, expected, &session).await {
            Ok(true) => {}
            Ok(false) => tracing::error!(session = session_id, "session changed during submission, outcome not recorded"),
            Err(e) => tracing::error!(session = session_id, error = %e, "failed to record submission outcome"),
        }
        self.flush_events(session_id, &mut session).await;
        match &outcome {
            Ok(placed) => tracing::info!(session = session_id, order_id = ?placed.order_id, "order placed"),
            Err(e) => tracing::warn!(session = session_id, error = %e, "order submission failed"),
        }
        Ok(outcome?)
    }

    /// Loads, applies `op`, and saves against the loaded revision, reloading
    /// and reapplying when another request saved in between.
    async fn apply<F>(&self, session_id: &str, op: F) -> Result<CheckoutSession>
    where
        F: Fn(&mut CheckoutSession, &SiteSettings) -> std::result::Result<(), CheckoutError>,
    {
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let mut session = self.session(session_id).await?;
            let before = session.step();
            let expected = session.revision();
            if let Err(e) = op(&mut session, &self.settings) {
                tracing::debug!(session = session_id, step = %before, error = %e, "checkout operation rejected");
                return Err(e.into());
            }
            session.advance_revision();
            if !self.store.save(session_id, expected, &session).await? {
                tracing::debug!(session = session_id, "concurrent update, reapplying");
                continue;
            }
            if session.step() != before {
                tracing::info!(session = session_id, from = %before, to = %session.step(), "checkout step changed");
            }
            self.flush_events(session_id, &mut session).await;
            return Ok(session);
        }
        Err(StoreError::Conflict(session_id.to_string()).into())
    }

    async fn flush_events(&self, session_id: &str, session: &mut CheckoutSession) {
        for event in session.take_events() {
            self.events.publish(session_id, &event).await;
        }
    }
}
