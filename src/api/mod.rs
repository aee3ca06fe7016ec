//! HTTP surface: one route per cart and checkout operation, keyed by session id.

use axum::{
    extract::{FromRequest, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::application::{CheckoutService, NewCartItem};
use crate::domain::ports::StoreError;
use crate::domain::aggregates::{CartError, CartItem, CartTotals, CheckoutError, CheckoutSession, CheckoutStep, FieldErrors, PlacedOrder, ShippingAddress};
use crate::domain::settings::SiteSettings;
use crate::domain::value_objects::Currency;
use crate::StorefrontError;

#[derive(Clone)]
pub struct AppState { pub checkout: CheckoutService }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront-checkout"})) }))
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/checkout/:session", get(get_session))
        .route("/api/v1/checkout/:session/currency", put(set_currency))
        .route("/api/v1/checkout/:session/items", post(add_item).put(update_item))
        .route("/api/v1/checkout/:session/items/:client_id", delete(remove_item))
        .route("/api/v1/checkout/:session/address", post(confirm_address))
        .route("/api/v1/checkout/:session/address/edit", post(edit_address))
        .route("/api/v1/checkout/:session/payment", post(confirm_payment))
        .route("/api/v1/checkout/:session/payment/edit", post(edit_payment))
        .route("/api/v1/checkout/:session/delivery", post(confirm_delivery))
        .route("/api/v1/checkout/:session/delivery/edit", post(edit_delivery))
        .route("/api/v1/checkout/:session/submit", post(submit))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

type ApiResult<T> = Result<Json<T>, StorefrontError>;

/// `Json` whose rejections come back in the same JSON error body as every other failure.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(StorefrontError))]
pub struct ApiJson<T>(pub T);

// === DTOs ===

/// Quantities arrive as form values, so numbers and numeric strings are both accepted.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item: NewCartItem,
    #[serde(default)]
    pub quantity: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub client_id: Uuid,
    #[serde(default)]
    pub quantity: Option<Value>,
}

fn parse_quantity(raw: Option<&Value>, default: Option<u32>) -> Result<u32, StorefrontError> {
    let invalid = || StorefrontError::from(CheckoutError::Validation(FieldErrors::single("quantity", "must be a whole number")));
    match raw {
        None | Some(Value::Null) => default
            .ok_or_else(|| CheckoutError::Validation(FieldErrors::single("quantity", "is required")).into()),
        Some(Value::Number(n)) => n.as_u64().and_then(|q| u32::try_from(q).ok()).ok_or_else(invalid),
        Some(Value::String(text)) => text.trim().parse::<u32>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CurrencyRequest { pub code: String }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest { pub payment_method: String }

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest { pub delivery_date_index: usize }

const PENDING: &str = "--";

/// Totals rendered in the session's display currency. Shipping reads `--`
/// until a delivery date is chosen, tax until an address is confirmed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedTotals {
    pub items_price: String,
    pub shipping_price: String,
    pub tax_price: String,
    pub total_price: String,
}

impl FormattedTotals {
    fn new(totals: &CartTotals, currency: &Currency, shipping_pending: bool, tax_pending: bool) -> Self {
        let pending_or = |pending: bool, amount| if pending { PENDING.to_string() } else { currency.format(amount) };
        Self {
            items_price: currency.format(totals.items_price),
            shipping_price: pending_or(shipping_pending, totals.shipping_price),
            tax_price: pending_or(tax_pending, totals.tax_price),
            total_price: currency.format(totals.total_price),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub step: CheckoutStep,
    pub items: Vec<CartItem>,
    pub quantity_count: u32,
    pub totals: Option<CartTotals>,
    pub formatted_totals: Option<FormattedTotals>,
    pub shipping_pending: bool,
    pub tax_pending: bool,
    pub currency: Currency,
    pub shipping_address: Option<ShippingAddress>,
    pub payment_method: Option<String>,
    pub delivery_date_index: usize,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    pub fn new(session_id: &str, session: &CheckoutSession, settings: &SiteSettings) -> Self {
        let currency = settings.currency(session.currency_code(settings));
        let totals = session.totals(settings);
        let shipping_pending = !session.has_delivery_date();
        let tax_pending = session.shipping_address().is_none();
        Self {
            session_id: session_id.to_string(),
            step: session.step(),
            items: session.cart().items().to_vec(),
            quantity_count: session.cart().quantity_count(),
            formatted_totals: totals.as_ref().map(|t| FormattedTotals::new(t, &currency, shipping_pending, tax_pending)),
            totals,
            shipping_pending,
            tax_pending,
            currency,
            shipping_address: session.shipping_address().cloned(),
            payment_method: session.payment_method(settings).map(str::to_string),
            delivery_date_index: session.delivery_date_index(settings),
            updated_at: session.cart().updated_at(),
        }
    }
}

// === Handlers ===

fn view(s: &AppState, id: &str, session: &CheckoutSession) -> Json<SessionView> {
    Json(SessionView::new(id, session, s.checkout.settings()))
}

async fn get_settings(State(s): State<AppState>) -> Json<SiteSettings> {
    Json(s.checkout.settings().clone())
}

async fn get_session(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<SessionView> {
    let session = s.checkout.session(&id).await?;
    Ok(view(&s, &id, &session))
}

async fn set_currency(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<CurrencyRequest>) -> ApiResult<SessionView> {
    let session = s.checkout.set_currency(&id, &r.code).await?;
    Ok(view(&s, &id, &session))
}

async fn add_item(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<AddItemRequest>) -> Result<(StatusCode, Json<SessionView>), StorefrontError> {
    let quantity = parse_quantity(r.quantity.as_ref(), Some(1))?;
    let session = s.checkout.add_item(&id, r.item, quantity).await?;
    Ok((StatusCode::CREATED, view(&s, &id, &session)))
}

async fn update_item(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<UpdateItemRequest>) -> ApiResult<SessionView> {
    let quantity = parse_quantity(r.quantity.as_ref(), None)?;
    let session = s.checkout.update_quantity(&id, r.client_id, quantity).await?;
    Ok(view(&s, &id, &session))
}

async fn remove_item(State(s): State<AppState>, Path((id, client_id)): Path<(String, Uuid)>) -> ApiResult<SessionView> {
    let session = s.checkout.remove_item(&id, client_id).await?;
    Ok(view(&s, &id, &session))
}

async fn confirm_address(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<ShippingAddress>) -> ApiResult<SessionView> {
    let session = s.checkout.confirm_address(&id, r).await?;
    Ok(view(&s, &id, &session))
}

async fn edit_address(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<SessionView> {
    let session = s.checkout.edit_address(&id).await?;
    Ok(view(&s, &id, &session))
}

async fn confirm_payment(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<PaymentRequest>) -> ApiResult<SessionView> {
    let session = s.checkout.confirm_payment(&id, &r.payment_method).await?;
    Ok(view(&s, &id, &session))
}

async fn edit_payment(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<SessionView> {
    let session = s.checkout.edit_payment(&id).await?;
    Ok(view(&s, &id, &session))
}

async fn confirm_delivery(State(s): State<AppState>, Path(id): Path<String>, ApiJson(r): ApiJson<DeliveryRequest>) -> ApiResult<SessionView> {
    let session = s.checkout.confirm_delivery(&id, r.delivery_date_index).await?;
    Ok(view(&s, &id, &session))
}

async fn edit_delivery(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<SessionView> {
    let session = s.checkout.edit_delivery(&id).await?;
    Ok(view(&s, &id, &session))
}

async fn submit(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<PlacedOrder> {
    Ok(Json(s.checkout.submit(&id).await?))
}

// === Errors ===

impl StorefrontError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(e) => match e {
                CheckoutError::Validation(_)
                | CheckoutError::UnknownPaymentMethod(_)
                | CheckoutError::UnknownCurrency(_)
                | CheckoutError::DeliveryOptionOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::Cart(CartError::ItemNotFound) => StatusCode::NOT_FOUND,
                CheckoutError::Cart(CartError::OutOfStock { .. }) => StatusCode::CONFLICT,
                CheckoutError::Cart(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::InvalidTransition { .. } | CheckoutError::EmptyCart | CheckoutError::SubmissionInFlight => StatusCode::CONFLICT,
                CheckoutError::SubmissionFailed(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Settings(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Body(rejection) => rejection.status(),
        }
    }

    fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            Self::Checkout(CheckoutError::Validation(fields)) => Some(fields.clone()),
            Self::Checkout(CheckoutError::Cart(CartError::PlayerId(e))) => Some(FieldErrors::single("player_id", e.to_string())),
            Self::Checkout(CheckoutError::Cart(CartError::InvalidQuantity)) => Some(FieldErrors::single("quantity", CartError::InvalidQuantity.to_string())),
            _ => None,
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let message = match &self {
            Self::Body(rejection) => rejection.body_text(),
            other => other.to_string(),
        };
        let body = match self.field_errors() {
            Some(fields) => json!({"error": message, "fields": fields}),
            None => json!({"error": message}),
        };
        (status, Json(body)).into_response()
    }
}
