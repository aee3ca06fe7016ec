//! Order Draft
//!
//! The not-yet-persisted order handed to the order-creation collaborator, plus
//! the shipping address it carries.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::aggregates::cart::{Cart, CartItem, CartTotals};
use crate::domain::settings::DeliveryDateOption;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    #[validate(custom = "not_blank")]
    pub full_name: String,
    #[validate(custom = "not_blank")]
    pub street: String,
    #[validate(custom = "not_blank")]
    pub city: String,
    #[validate(custom = "not_blank")]
    pub province: String,
    #[validate(custom = "not_blank")]
    pub postal_code: String,
    #[validate(custom = "not_blank")]
    pub country: String,
    #[validate(custom = "phone_number")]
    pub phone: String,
}

impl ShippingAddress {
    /// Validates every field, collecting messages per field.
    pub fn check(&self) -> Result<(), FieldErrors> {
        self.validate().map_err(FieldErrors::from)
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(Cow::from("is required"));
        return Err(err);
    }
    Ok(())
}

const MIN_PHONE_DIGITS: usize = 6;

fn phone_number(value: &str) -> Result<(), ValidationError> {
    not_blank(value)?;
    let allowed = value.chars().all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'));
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if !allowed || digits < MIN_PHONE_DIGITS {
        let mut err = ValidationError::new("phone");
        err.message = Some(Cow::from("must be a valid phone number"));
        return Err(err);
    }
    Ok(())
}

/// Field-scoped validation messages, keyed by the camelCase field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(camel_case(field)).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> { self.0.get(field).map(Vec::as_slice) }
    pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn len(&self) -> usize { self.0.len() }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(field, msgs)| format!("{field} {}", msgs.join(", "))).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::default();
        for (field, list) in errors.field_errors() {
            for err in list {
                let message = err.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| err.code.to_string());
                out.push(field, message);
            }
        }
        out
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for ch in field.chars() {
        if ch == '_' { upper = true; continue; }
        if upper { out.extend(ch.to_uppercase()); upper = false; } else { out.push(ch); }
    }
    out
}

/// Everything the order-creation collaborator needs, with totals derived from the cart.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    items: Vec<CartItem>,
    shipping_address: ShippingAddress,
    payment_method: String,
    delivery_date_index: usize,
    expected_delivery_date: DateTime<Utc>,
    items_price: Decimal,
    shipping_price: Decimal,
    tax_price: Decimal,
    total_price: Decimal,
}

impl OrderDraft {
    pub fn build(
        cart: &Cart,
        shipping_address: ShippingAddress,
        payment_method: impl Into<String>,
        delivery_date_index: usize,
        delivery: &DeliveryDateOption,
        tax_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let totals = cart.compute_totals(delivery, tax_rate);
        Self {
            items: cart.items().to_vec(),
            shipping_address,
            payment_method: payment_method.into(),
            delivery_date_index,
            expected_delivery_date: now + Duration::days(i64::from(delivery.days_to_deliver)),
            items_price: totals.items_price,
            shipping_price: totals.shipping_price,
            tax_price: totals.tax_price,
            total_price: totals.total_price,
        }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn payment_method(&self) -> &str { &self.payment_method }
    pub fn delivery_date_index(&self) -> usize { self.delivery_date_index }
    pub fn expected_delivery_date(&self) -> DateTime<Utc> { self.expected_delivery_date }

    pub fn totals(&self) -> CartTotals {
        CartTotals {
            items_price: self.items_price, shipping_price: self.shipping_price,
            tax_price: self.tax_price, total_price: self.total_price,
        }
    }
}

/// Outcome reported by the order-creation collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreationResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CreatedOrder>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: String,
}

impl OrderCreationResponse {
    pub fn created(order_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), data: Some(CreatedOrder { order_id: order_id.into() }) }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }

    pub fn order_id(&self) -> Option<&str> { self.data.as_ref().map(|d| d.order_id.as_str()) }
}
