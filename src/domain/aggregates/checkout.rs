//! Checkout Session
//!
//! One explicit context per shopper: the cart, the shipping address and
//! selections, and the current step of the checkout sequence.
//!
//! Steps advance strictly in order:
//!
//! ```text
//! AwaitingAddress -> AwaitingPayment -> AwaitingDelivery -> ReadyToSubmit -> Submitting
//! ```
//!
//! Editing an earlier step reopens it and closes every later one, while the
//! values already entered stay around as defaults. `Submitting` is the
//! in-flight state of an order submission; nothing else may change the
//! session until the collaborator answers or the submission lease runs out.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::{Cart, CartError, CartItem, CartTotals, ItemIdentity};
use crate::domain::aggregates::order::{FieldErrors, OrderCreationResponse, OrderDraft, ShippingAddress};
use crate::domain::events::CheckoutEvent;
use crate::domain::ports::OrderGateway;
use crate::domain::settings::SiteSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStep {
    #[default]
    AwaitingAddress,
    AwaitingPayment,
    AwaitingDelivery,
    ReadyToSubmit,
    Submitting,
}

impl CheckoutStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingAddress => "awaiting_address",
            Self::AwaitingPayment => "awaiting_payment",
            Self::AwaitingDelivery => "awaiting_delivery",
            Self::ReadyToSubmit => "ready_to_submit",
            Self::Submitting => "submitting",
        }
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A successfully created order and where the shopper goes next. The
/// collaborator may confirm an order without reporting its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: Option<String>,
    pub message: String,
    pub redirect: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    id: Uuid,
    step: CheckoutStep,
    cart: Cart,
    shipping_address: Option<ShippingAddress>,
    payment_method: Option<String>,
    delivery_date_index: Option<usize>,
    currency: Option<String>,
    /// Bumped on every save; stores only accept a save based on the latest revision.
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    submitting_since: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<CheckoutEvent>,
}

impl Default for CheckoutSession { fn default() -> Self { Self::new() } }

impl CheckoutSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(), step: CheckoutStep::AwaitingAddress, cart: Cart::new(),
            shipping_address: None, payment_method: None, delivery_date_index: None,
            currency: None, revision: 0, submitting_since: None, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn step(&self) -> CheckoutStep { self.step }
    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn shipping_address(&self) -> Option<&ShippingAddress> { self.shipping_address.as_ref() }
    pub fn is_submitting(&self) -> bool { self.step == CheckoutStep::Submitting }
    pub fn has_delivery_date(&self) -> bool { self.delivery_date_index.is_some() }
    pub fn revision(&self) -> u64 { self.revision }
    pub fn advance_revision(&mut self) { self.revision += 1; }

    /// Chosen payment method, or the site default.
    pub fn payment_method<'a>(&'a self, settings: &'a SiteSettings) -> Option<&'a str> {
        self.payment_method.as_deref().or_else(|| settings.default_payment().map(|p| p.name.as_str()))
    }

    /// Chosen delivery option index, or the site default.
    pub fn delivery_date_index(&self, settings: &SiteSettings) -> usize {
        self.delivery_date_index.unwrap_or_else(|| settings.default_delivery_index())
    }

    pub fn currency_code<'a>(&'a self, settings: &'a SiteSettings) -> &'a str {
        self.currency.as_deref().unwrap_or(settings.default_currency.as_str())
    }

    /// Totals for the currently selected (or default) delivery option.
    pub fn totals(&self, settings: &SiteSettings) -> Option<CartTotals> {
        let delivery = settings.delivery_date(self.delivery_date_index(settings))?;
        Some(self.cart.compute_totals(delivery, settings.tax_rate))
    }

    pub fn set_currency(&mut self, settings: &SiteSettings, code: &str) -> Result<(), CheckoutError> {
        self.ensure_idle()?;
        let currency = settings.available_currencies.iter().find(|c| c.code.eq_ignore_ascii_case(code))
            .ok_or_else(|| CheckoutError::UnknownCurrency(code.to_string()))?;
        self.currency = Some(currency.code.clone());
        Ok(())
    }

    // === Cart ===

    pub fn add_item(&mut self, item: CartItem, quantity: u32) -> Result<Uuid, CheckoutError> {
        self.ensure_idle()?;
        let product_ref = item.product_ref.clone();
        let client_id = self.cart.add_item(item, quantity)?;
        self.raise_event(CheckoutEvent::ItemAdded { product_ref, quantity });
        Ok(client_id)
    }

    pub fn update_quantity(&mut self, identity: &ItemIdentity, quantity: u32) -> Result<Option<u32>, CheckoutError> {
        self.ensure_idle()?;
        let stored = self.cart.update_quantity(identity, quantity)?;
        if stored.is_none() {
            self.raise_event(CheckoutEvent::ItemRemoved { product_ref: identity.product_ref.clone() });
        }
        Ok(stored)
    }

    pub fn remove_item(&mut self, identity: &ItemIdentity) -> Result<CartItem, CheckoutError> {
        self.ensure_idle()?;
        let removed = self.cart.remove_item(identity)?;
        self.raise_event(CheckoutEvent::ItemRemoved { product_ref: removed.product_ref.clone() });
        Ok(removed)
    }

    // === Steps ===

    pub fn confirm_address(&mut self, address: ShippingAddress) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::AwaitingAddress, "confirm the shipping address")?;
        address.check().map_err(CheckoutError::Validation)?;
        self.shipping_address = Some(address);
        self.step = CheckoutStep::AwaitingPayment;
        self.raise_event(CheckoutEvent::AddressConfirmed);
        Ok(())
    }

    /// Reopens the address step from anywhere, closing payment and delivery.
    pub fn edit_address(&mut self) -> Result<(), CheckoutError> {
        self.ensure_idle()?;
        self.step = CheckoutStep::AwaitingAddress;
        Ok(())
    }

    pub fn edit_payment(&mut self) -> Result<(), CheckoutError> {
        self.ensure_idle()?;
        match self.step {
            CheckoutStep::AwaitingDelivery | CheckoutStep::ReadyToSubmit => {
                self.step = CheckoutStep::AwaitingPayment;
                Ok(())
            }
            CheckoutStep::AwaitingPayment => Ok(()),
            step => Err(CheckoutError::InvalidTransition { step, action: "change the payment method" }),
        }
    }

    pub fn edit_delivery(&mut self) -> Result<(), CheckoutError> {
        self.ensure_idle()?;
        match self.step {
            CheckoutStep::ReadyToSubmit => {
                self.step = CheckoutStep::AwaitingDelivery;
                Ok(())
            }
            CheckoutStep::AwaitingDelivery => Ok(()),
            step => Err(CheckoutError::InvalidTransition { step, action: "change the delivery date" }),
        }
    }

    pub fn confirm_payment(&mut self, settings: &SiteSettings, method: &str) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::AwaitingPayment, "confirm the payment method")?;
        let option = settings.payment_method(method).ok_or_else(|| CheckoutError::UnknownPaymentMethod(method.to_string()))?;
        self.payment_method = Some(option.name.clone());
        self.step = CheckoutStep::AwaitingDelivery;
        self.raise_event(CheckoutEvent::PaymentConfirmed { method: option.name.clone() });
        Ok(())
    }

    pub fn confirm_delivery(&mut self, settings: &SiteSettings, index: usize) -> Result<(), CheckoutError> {
        self.expect_step(CheckoutStep::AwaitingDelivery, "confirm the delivery date")?;
        let option = settings.delivery_date(index).ok_or(CheckoutError::DeliveryOptionOutOfRange {
            index, available: settings.available_delivery_dates.len(),
        })?;
        self.delivery_date_index = Some(index);
        self.step = CheckoutStep::ReadyToSubmit;
        self.raise_event(CheckoutEvent::DeliveryConfirmed { index, name: option.name.clone() });
        Ok(())
    }

    // === Submission ===

    /// Builds the draft and enters `Submitting`. Nothing changes on error.
    pub fn begin_submit(&mut self, settings: &SiteSettings, now: DateTime<Utc>) -> Result<OrderDraft, CheckoutError> {
        self.expect_step(CheckoutStep::ReadyToSubmit, "place the order")?;
        if self.cart.is_empty() { return Err(CheckoutError::EmptyCart); }

        let address = self.shipping_address.clone().ok_or(CheckoutError::InvalidTransition {
            step: self.step, action: "place the order without an address",
        })?;
        let payment = self.payment_method(settings).map(str::to_string)
            .ok_or_else(|| CheckoutError::UnknownPaymentMethod(String::new()))?;
        let index = self.delivery_date_index(settings);
        let delivery = settings.delivery_date(index).ok_or(CheckoutError::DeliveryOptionOutOfRange {
            index, available: settings.available_delivery_dates.len(),
        })?;

        let draft = OrderDraft::build(&self.cart, address, payment, index, delivery, settings.tax_rate, now);
        self.step = CheckoutStep::Submitting;
        self.submitting_since = Some(now);
        Ok(draft)
    }

    /// Applies the collaborator's answer to an in-flight submission.
    ///
    /// Success clears the cart and restarts the sequence with the entered
    /// values kept as defaults, whether or not an order id came back. Failure
    /// returns to `ReadyToSubmit` and hands back the collaborator's message
    /// untouched.
    pub fn complete_submit(&mut self, total: Decimal, response: OrderCreationResponse) -> Result<PlacedOrder, CheckoutError> {
        if self.step != CheckoutStep::Submitting {
            return Err(CheckoutError::InvalidTransition { step: self.step, action: "complete a submission" });
        }
        self.submitting_since = None;
        match response {
            OrderCreationResponse { success: true, message, data } => {
                let order_id = data.map(|created| created.order_id);
                self.cart.clear();
                self.step = CheckoutStep::AwaitingAddress;
                self.raise_event(CheckoutEvent::OrderPlaced { order_id: order_id.clone(), total });
                Ok(PlacedOrder { redirect: order_id.as_ref().map(|id| format!("/checkout/{id}")), order_id, message })
            }
            OrderCreationResponse { message, .. } => {
                self.step = CheckoutStep::ReadyToSubmit;
                self.raise_event(CheckoutEvent::OrderRejected { message: message.clone() });
                Err(CheckoutError::SubmissionFailed(message))
            }
        }
    }

    /// Runs a whole submission against `gateway`. The gateway is only called
    /// from `ReadyToSubmit`.
    pub async fn submit(&mut self, settings: &SiteSettings, gateway: &dyn OrderGateway) -> Result<PlacedOrder, CheckoutError> {
        let draft = self.begin_submit(settings, Utc::now())?;
        let response = gateway.create_order(&draft).await;
        self.complete_submit(draft.totals().total_price, response)
    }

    /// Returns a submission older than `lease` to `ReadyToSubmit`, so a lost
    /// answer or a crashed worker never locks the session for good.
    pub fn recover_stale_submission(&mut self, now: DateTime<Utc>, lease: Duration) -> bool {
        if self.step != CheckoutStep::Submitting { return false; }
        let stale = self.submitting_since.map_or(true, |since| now - since >= lease);
        if stale {
            self.step = CheckoutStep::ReadyToSubmit;
            self.submitting_since = None;
        }
        stale
    }

    pub fn take_events(&mut self) -> Vec<CheckoutEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CheckoutEvent) { self.events.push(e); }

    fn ensure_idle(&self) -> Result<(), CheckoutError> {
        if self.is_submitting() { Err(CheckoutError::SubmissionInFlight) } else { Ok(()) }
    }

    fn expect_step(&self, expected: CheckoutStep, action: &'static str) -> Result<(), CheckoutError> {
        self.ensure_idle()?;
        if self.step != expected { return Err(CheckoutError::InvalidTransition { step: self.step, action }); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckoutError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("cannot {action} while {step}")]
    InvalidTransition { step: CheckoutStep, action: &'static str },

    #[error("unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("delivery option {index} out of range ({available} available)")]
    DeliveryOptionOutOfRange { index: usize, available: usize },

    #[error("cart is empty")]
    EmptyCart,

    #[error("an order submission is already in progress")]
    SubmissionInFlight,

    #[error("{0}")]
    SubmissionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockOrderGateway;
    use crate::domain::value_objects::PlayerId;
    use rust_decimal_macros::dec;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Jane Doe".into(), street: "1911 Sherbrooke Est".into(), city: "Montreal".into(),
            province: "Quebec".into(), postal_code: "H2X 1C4".into(), country: "Canada".into(),
            phone: "4181234567".into(),
        }
    }

    fn session_with_item() -> CheckoutSession {
        let mut session = CheckoutSession::new();
        let item = CartItem::new("P1", "Gems", dec!(19.99), 10, PlayerId::new("abc123").unwrap());
        session.add_item(item, 2).unwrap();
        session
    }

    fn ready(settings: &SiteSettings) -> CheckoutSession {
        let mut session = session_with_item();
        session.confirm_address(address()).unwrap();
        session.confirm_payment(settings, "Stripe").unwrap();
        session.confirm_delivery(settings, 0).unwrap();
        session
    }

    #[test]
    fn test_happy_path_steps() {
        let settings = SiteSettings::default();
        let mut session = session_with_item();
        assert_eq!(session.step(), CheckoutStep::AwaitingAddress);
        session.confirm_address(address()).unwrap();
        assert_eq!(session.step(), CheckoutStep::AwaitingPayment);
        session.confirm_payment(&settings, "Stripe").unwrap();
        assert_eq!(session.step(), CheckoutStep::AwaitingDelivery);
        session.confirm_delivery(&settings, 1).unwrap();
        assert_eq!(session.step(), CheckoutStep::ReadyToSubmit);
        assert_eq!(session.delivery_date_index(&settings), 1);
        assert_eq!(session.take_events().len(), 4);
    }

    #[test]
    fn test_invalid_address_never_advances() {
        let mut session = session_with_item();
        let mut bad = address();
        bad.city = String::new();
        for _ in 0..2 {
            match session.confirm_address(bad.clone()) {
                Err(CheckoutError::Validation(errors)) => assert!(errors.get("city").is_some()),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(session.step(), CheckoutStep::AwaitingAddress);
            assert!(session.shipping_address().is_none());
        }
    }

    #[test]
    fn test_edit_address_keeps_values() {
        let settings = SiteSettings::default();
        let mut session = session_with_item();
        session.confirm_address(address()).unwrap();
        session.confirm_payment(&settings, "Stripe").unwrap();
        session.edit_address().unwrap();
        assert_eq!(session.step(), CheckoutStep::AwaitingAddress);
        assert_eq!(session.shipping_address(), Some(&address()));
        assert_eq!(session.payment_method(&settings), Some("Stripe"));
        assert!(matches!(session.confirm_delivery(&settings, 0), Err(CheckoutError::InvalidTransition { .. })));
    }

    #[test]
    fn test_edit_payment_and_delivery_reopen_one_step() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        session.edit_delivery().unwrap();
        assert_eq!(session.step(), CheckoutStep::AwaitingDelivery);
        session.edit_payment().unwrap();
        assert_eq!(session.step(), CheckoutStep::AwaitingPayment);
        assert!(session.edit_delivery().is_err());
        session.edit_address().unwrap();
        assert!(matches!(session.edit_payment(), Err(CheckoutError::InvalidTransition { step: CheckoutStep::AwaitingAddress, .. })));
    }

    #[test]
    fn test_unknown_payment_and_delivery_range() {
        let settings = SiteSettings::default();
        let mut session = session_with_item();
        session.confirm_address(address()).unwrap();
        assert_eq!(session.confirm_payment(&settings, "Bitcoin"), Err(CheckoutError::UnknownPaymentMethod("Bitcoin".into())));
        assert_eq!(session.step(), CheckoutStep::AwaitingPayment);
        session.confirm_payment(&settings, "PayPal").unwrap();
        assert_eq!(
            session.confirm_delivery(&settings, 3),
            Err(CheckoutError::DeliveryOptionOutOfRange { index: 3, available: 3 })
        );
        assert_eq!(session.step(), CheckoutStep::AwaitingDelivery);
    }

    #[test]
    fn test_defaults_come_from_settings() {
        let settings = SiteSettings::default();
        let session = CheckoutSession::new();
        assert_eq!(session.payment_method(&settings), Some("PayPal"));
        assert_eq!(session.delivery_date_index(&settings), 2);
        assert_eq!(session.currency_code(&settings), "USD");
    }

    #[tokio::test]
    async fn test_submit_outside_ready_makes_no_call() {
        let settings = SiteSettings::default();
        let mut gateway = MockOrderGateway::new();
        gateway.expect_create_order().times(0);

        let mut session = session_with_item();
        session.confirm_address(address()).unwrap();
        let before = session.clone();
        let err = session.submit(&settings, &gateway).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTransition { step: CheckoutStep::AwaitingPayment, .. }));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn test_submit_success_clears_cart() {
        let settings = SiteSettings::default();
        let mut gateway = MockOrderGateway::new();
        gateway.expect_create_order()
            .withf(|draft| draft.payment_method() == "Stripe" && draft.totals().items_price == dec!(39.98))
            .times(1)
            .returning(|_| OrderCreationResponse::created("ord-1", "Order placed successfully"));

        let mut session = ready(&settings);
        let placed = session.submit(&settings, &gateway).await.unwrap();
        assert_eq!(placed.order_id.as_deref(), Some("ord-1"));
        assert_eq!(placed.redirect.as_deref(), Some("/checkout/ord-1"));
        assert!(session.cart().is_empty());
        assert_eq!(session.step(), CheckoutStep::AwaitingAddress);
        assert_eq!(session.shipping_address(), Some(&address()));
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_cart_and_message() {
        let settings = SiteSettings::default();
        let mut gateway = MockOrderGateway::new();
        gateway.expect_create_order().times(1).returning(|_| OrderCreationResponse::failed("Card declined: insufficient funds"));

        let mut session = ready(&settings);
        let err = session.submit(&settings, &gateway).await.unwrap_err();
        assert_eq!(err, CheckoutError::SubmissionFailed("Card declined: insufficient funds".into()));
        assert_eq!(err.to_string(), "Card declined: insufficient funds");
        assert_eq!(session.step(), CheckoutStep::ReadyToSubmit);
        assert_eq!(session.cart().item_count(), 1);
    }

    #[test]
    fn test_in_flight_blocks_everything() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        session.begin_submit(&settings, Utc::now()).unwrap();
        assert!(session.is_submitting());
        assert_eq!(session.begin_submit(&settings, Utc::now()).unwrap_err(), CheckoutError::SubmissionInFlight);
        assert_eq!(session.edit_address(), Err(CheckoutError::SubmissionInFlight));
        let identity = session.cart().items()[0].identity();
        assert_eq!(session.update_quantity(&identity, 1), Err(CheckoutError::SubmissionInFlight));
        assert_eq!(session.cart().items()[0].quantity, 2);
    }

    #[test]
    fn test_success_without_order_id_still_clears_cart() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        session.begin_submit(&settings, Utc::now()).unwrap();
        let response = OrderCreationResponse { success: true, message: "Order placed successfully".into(), data: None };

        let placed = session.complete_submit(dec!(45.98), response).unwrap();
        assert_eq!(placed.order_id, None);
        assert_eq!(placed.redirect, None);
        assert_eq!(placed.message, "Order placed successfully");
        assert!(session.cart().is_empty());
        assert_eq!(session.step(), CheckoutStep::AwaitingAddress);
    }

    #[test]
    fn test_stale_submission_is_recovered_after_lease() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        let started = Utc::now();
        session.begin_submit(&settings, started).unwrap();

        assert!(!session.recover_stale_submission(started + Duration::seconds(10), Duration::seconds(60)));
        assert!(session.is_submitting());
        assert!(session.recover_stale_submission(started + Duration::seconds(60), Duration::seconds(60)));
        assert_eq!(session.step(), CheckoutStep::ReadyToSubmit);
        assert_eq!(session.cart().item_count(), 1);
        session.edit_address().unwrap();
    }

    #[test]
    fn test_recovery_ignores_idle_sessions() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        assert!(!session.recover_stale_submission(Utc::now(), Duration::zero()));
        assert_eq!(session.step(), CheckoutStep::ReadyToSubmit);
    }

    #[test]
    fn test_empty_cart_cannot_submit() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        let identity = session.cart().items()[0].identity();
        session.remove_item(&identity).unwrap();
        assert_eq!(session.begin_submit(&settings, Utc::now()).unwrap_err(), CheckoutError::EmptyCart);
        assert_eq!(session.step(), CheckoutStep::ReadyToSubmit);
    }

    #[test]
    fn test_session_round_trips_through_json() {
        let settings = SiteSettings::default();
        let mut session = ready(&settings);
        session.take_events();
        let json = serde_json::to_string(&session).unwrap();
        let restored: CheckoutSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
        assert!(json.contains("READY_TO_SUBMIT"));
    }
}
