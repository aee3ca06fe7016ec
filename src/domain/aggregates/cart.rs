//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::settings::DeliveryDateOption;
use crate::domain::value_objects::{round2, PlayerId, PlayerIdError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub client_id: Uuid,
    pub product_ref: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub unit_price: Decimal,
    pub count_in_stock: u32,
    pub quantity: u32,
    pub image_ref: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub player_id: PlayerId,
}

/// Product + variant key under which cart lines merge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub product_ref: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub player_id: PlayerId,
}

impl CartItem {
    pub fn new(product_ref: impl Into<String>, name: impl Into<String>, unit_price: Decimal, count_in_stock: u32, player_id: PlayerId) -> Self {
        Self {
            client_id: Uuid::new_v4(), product_ref: product_ref.into(), name: name.into(),
            slug: String::new(), category: String::new(), unit_price, count_in_stock, quantity: 1,
            image_ref: String::new(), size: None, color: None, player_id,
        }
    }

    pub fn with_variant(mut self, size: Option<String>, color: Option<String>) -> Self {
        self.size = size;
        self.color = color;
        self
    }

    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity {
            product_ref: self.product_ref.clone(), size: self.size.clone(),
            color: self.color.clone(), player_id: self.player_id.clone(),
        }
    }

    fn matches(&self, identity: &ItemIdentity) -> bool {
        self.product_ref == identity.product_ref && self.size == identity.size
            && self.color == identity.color && self.player_id == identity.player_id
    }

    pub fn line_total(&self) -> Decimal { round2(self.unit_price * Decimal::from(self.quantity)) }
}

/// Derived order amounts, all in the store's base currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub items_price: Decimal,
    pub shipping_price: Decimal,
    pub tax_price: Decimal,
    pub total_price: Decimal,
}

impl Default for Cart { fn default() -> Self { Self::new() } }

impl Cart {
    pub fn new() -> Self { Self { items: vec![], updated_at: Utc::now() } }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn quantity_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn find_by_client_id(&self, client_id: Uuid) -> Option<&CartItem> { self.items.iter().find(|i| i.client_id == client_id) }

    /// Adds `quantity` units of `item`, merging with an existing line of the same identity.
    ///
    /// Exceeding stock is rejected here; the cart is left untouched on error.
    pub fn add_item(&mut self, mut item: CartItem, quantity: u32) -> Result<Uuid, CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if item.unit_price < Decimal::ZERO { return Err(CartError::InvalidPrice); }

        let identity = item.identity();
        if let Some(existing) = self.items.iter_mut().find(|i| i.matches(&identity)) {
            let requested = existing.quantity.saturating_add(quantity);
            if requested > item.count_in_stock {
                return Err(CartError::OutOfStock { name: item.name, requested, available: item.count_in_stock });
            }
            existing.quantity = requested;
            existing.count_in_stock = item.count_in_stock;
            existing.unit_price = round2(item.unit_price);
            let client_id = existing.client_id;
            self.touch();
            return Ok(client_id);
        }

        if quantity > item.count_in_stock {
            return Err(CartError::OutOfStock { name: item.name, requested: quantity, available: item.count_in_stock });
        }
        if item.client_id.is_nil() { item.client_id = Uuid::new_v4(); }
        item.unit_price = round2(item.unit_price);
        item.quantity = quantity;
        let client_id = item.client_id;
        self.items.push(item);
        self.touch();
        Ok(client_id)
    }

    /// Sets a line's quantity. Zero removes the line, anything else is clamped to stock.
    ///
    /// Returns the stored quantity, or `None` when the line was removed.
    pub fn update_quantity(&mut self, identity: &ItemIdentity, quantity: u32) -> Result<Option<u32>, CartError> {
        if quantity == 0 {
            self.remove_item(identity)?;
            return Ok(None);
        }
        let item = self.items.iter_mut().find(|i| i.matches(identity)).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity.min(item.count_in_stock).max(1);
        let stored = item.quantity;
        self.touch();
        Ok(Some(stored))
    }

    pub fn remove_item(&mut self, identity: &ItemIdentity) -> Result<CartItem, CartError> {
        let index = self.items.iter().position(|i| i.matches(identity)).ok_or(CartError::ItemNotFound)?;
        let removed = self.items.remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    /// Order amounts for the given delivery option and tax rate.
    pub fn compute_totals(&self, delivery: &DeliveryDateOption, tax_rate: Decimal) -> CartTotals {
        let items_price = round2(self.items.iter().map(CartItem::line_total).sum());
        let shipping_price = delivery.shipping_for(items_price);
        let tax_price = round2(items_price * tax_rate);
        CartTotals { items_price, shipping_price, tax_price, total_price: round2(items_price + shipping_price + tax_price) }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found in cart")]
    ItemNotFound,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Price must not be negative")]
    InvalidPrice,

    #[error("Not enough items in stock for {name}: requested {requested}, available {available}")]
    OutOfStock { name: String, requested: u32, available: u32 },

    #[error(transparent)]
    PlayerId(#[from] PlayerIdError),
}
