//! Storefront Checkout
//!
//! Cart, pricing and checkout core of a storefront, with a small HTTP service
//! in front of it.
//!
//! ## Features
//! - Cart aggregation keyed by product and variant
//! - Order totals with free-shipping thresholds and tax
//! - Multi-currency price formatting
//! - Checkout step machine (address, payment, delivery date, submit)
//! - Order submission to a pluggable order-creation collaborator

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

use thiserror::Error;

use domain::aggregates::{CartError, CheckoutError};
use domain::ports::StoreError;
use domain::settings::SettingsError;

pub use application::CheckoutService;
pub use config::Config;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Body(#[from] axum::extract::rejection::JsonRejection),
}

impl From<CartError> for StorefrontError {
    fn from(e: CartError) -> Self { Self::Checkout(CheckoutError::Cart(e)) }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
