//! Aggregates module
pub mod cart;
pub mod checkout;
pub mod order;

pub use cart::{Cart, CartError, CartItem, CartTotals, ItemIdentity};
pub use checkout::{CheckoutError, CheckoutSession, CheckoutStep, PlacedOrder};
pub use order::{CreatedOrder, FieldErrors, OrderCreationResponse, OrderDraft, ShippingAddress};
