//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutEvent {
    ItemAdded { product_ref: String, quantity: u32 },
    ItemRemoved { product_ref: String },
    AddressConfirmed,
    PaymentConfirmed { method: String },
    DeliveryConfirmed { index: usize, name: String },
    OrderPlaced { order_id: Option<String>, total: Decimal },
    OrderRejected { message: String },
}

impl CheckoutEvent {
    /// Subject suffix used when the event leaves the process.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "item_added",
            Self::ItemRemoved { .. } => "item_removed",
            Self::AddressConfirmed => "address_confirmed",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
            Self::DeliveryConfirmed { .. } => "delivery_confirmed",
            Self::OrderPlaced { .. } => "order_placed",
            Self::OrderRejected { .. } => "order_rejected",
        }
    }
}
