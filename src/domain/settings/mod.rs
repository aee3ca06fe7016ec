//! Site settings: delivery dates, payment methods and currencies.
//!
//! Read once at startup and shared read-only with every checkout session.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::value_objects::Currency;

/// A named shipping speed with its price and free-shipping threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDateOption {
    pub name: String,
    pub days_to_deliver: u32,
    pub shipping_price: Decimal,
    pub free_shipping_min_price: Decimal,
}

impl DeliveryDateOption {
    pub fn new(name: impl Into<String>, days_to_deliver: u32, shipping_price: Decimal, free_shipping_min_price: Decimal) -> Self {
        Self { name: name.into(), days_to_deliver, shipping_price, free_shipping_min_price }
    }

    /// Shipping charged for an order whose items total `items_price`.
    pub fn shipping_for(&self, items_price: Decimal) -> Decimal {
        if items_price >= self.free_shipping_min_price { Decimal::ZERO } else { self.shipping_price }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodOption {
    pub name: String,
    pub commission: Decimal,
}

impl PaymentMethodOption {
    pub fn new(name: impl Into<String>, commission: Decimal) -> Self { Self { name: name.into(), commission } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub site_name: String,
    pub tax_rate: Decimal,
    pub available_currencies: Vec<Currency>,
    pub default_currency: String,
    pub available_payment_methods: Vec<PaymentMethodOption>,
    pub default_payment_method: String,
    pub available_delivery_dates: Vec<DeliveryDateOption>,
    pub default_delivery_date: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Storefront".to_string(),
            tax_rate: Decimal::new(15, 2),
            available_currencies: vec![
                Currency::usd(),
                Currency::new("Euro", "EUR", "€", Decimal::new(96, 2)),
                Currency::new("UAE Dirham", "AED", "AED ", Decimal::new(367, 2)),
            ],
            default_currency: "USD".to_string(),
            available_payment_methods: vec![
                PaymentMethodOption::new("PayPal", Decimal::ZERO),
                PaymentMethodOption::new("Stripe", Decimal::ZERO),
                PaymentMethodOption::new("Cash On Delivery", Decimal::ZERO),
            ],
            default_payment_method: "PayPal".to_string(),
            available_delivery_dates: vec![
                DeliveryDateOption::new("Tomorrow", 1, Decimal::new(1290, 2), Decimal::new(200, 0)),
                DeliveryDateOption::new("Next 3 Days", 3, Decimal::new(690, 2), Decimal::new(100, 0)),
                DeliveryDateOption::new("Next 5 Days", 5, Decimal::new(490, 2), Decimal::new(35, 0)),
            ],
            default_delivery_date: "Next 5 Days".to_string(),
        }
    }
}

impl SiteSettings {
    /// Loads settings from a JSON file, normalizes defaults and validates.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Io(path.display().to_string(), e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SettingsError> {
        let mut settings: SiteSettings = serde_json::from_str(raw)?;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    /// Clears default selections that no longer name an available entry.
    pub fn normalize(&mut self) {
        if !self.available_currencies.iter().any(|c| c.code == self.default_currency) {
            self.default_currency.clear();
        }
        if self.payment_method(&self.default_payment_method).is_none() {
            self.default_payment_method.clear();
        }
        if !self.available_delivery_dates.iter().any(|d| d.name == self.default_delivery_date) {
            self.default_delivery_date.clear();
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tax_rate < Decimal::ZERO || self.tax_rate > Decimal::ONE {
            return Err(SettingsError::Invalid(format!("tax rate {} must be between 0 and 1", self.tax_rate)));
        }
        if self.available_delivery_dates.is_empty() { return Err(SettingsError::Missing("delivery dates")); }
        if self.available_payment_methods.is_empty() { return Err(SettingsError::Missing("payment methods")); }
        if self.available_currencies.is_empty() { return Err(SettingsError::Missing("currencies")); }

        unique_names("delivery date", self.available_delivery_dates.iter().map(|d| d.name.as_str()))?;
        unique_names("payment method", self.available_payment_methods.iter().map(|p| p.name.as_str()))?;
        unique_names("currency", self.available_currencies.iter().map(|c| c.code.as_str()))?;

        for d in &self.available_delivery_dates {
            if d.shipping_price < Decimal::ZERO || d.free_shipping_min_price < Decimal::ZERO {
                return Err(SettingsError::Invalid(format!("delivery date {} has a negative price", d.name)));
            }
        }
        for p in &self.available_payment_methods {
            if p.commission < Decimal::ZERO {
                return Err(SettingsError::Invalid(format!("payment method {} has a negative commission", p.name)));
            }
        }
        for c in &self.available_currencies {
            if c.symbol.is_empty() || c.convert_rate <= Decimal::ZERO {
                return Err(SettingsError::Invalid(format!("currency {} needs a symbol and a positive rate", c.code)));
            }
        }
        Ok(())
    }

    pub fn delivery_date(&self, index: usize) -> Option<&DeliveryDateOption> { self.available_delivery_dates.get(index) }

    pub fn payment_method(&self, name: &str) -> Option<&PaymentMethodOption> {
        self.available_payment_methods.iter().find(|p| p.name == name)
    }

    /// Index of the default delivery date, or the first option.
    pub fn default_delivery_index(&self) -> usize {
        self.available_delivery_dates.iter().position(|d| d.name == self.default_delivery_date).unwrap_or(0)
    }

    pub fn default_payment(&self) -> Option<&PaymentMethodOption> {
        self.payment_method(&self.default_payment_method).or_else(|| self.available_payment_methods.first())
    }

    /// Looks up a currency by code, falling back to the default currency.
    pub fn currency(&self, code: &str) -> Currency {
        self.available_currencies.iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .or_else(|| self.available_currencies.iter().find(|c| c.code == self.default_currency))
            .or_else(|| self.available_currencies.first())
            .cloned()
            .unwrap_or_default()
    }
}

fn unique_names<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), SettingsError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() { return Err(SettingsError::Invalid(format!("{kind} name is required"))); }
        if !seen.insert(name) { return Err(SettingsError::Invalid(format!("duplicate {kind} name: {name}"))); }
    }
    Ok(())
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("malformed settings: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("at least one entry required: {0}")]
    Missing(&'static str),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_settings_are_valid() {
        let s = SiteSettings::default();
        s.validate().unwrap();
        assert_eq!(s.default_delivery_index(), 2);
        assert_eq!(s.default_payment().unwrap().name, "PayPal");
    }

    #[test]
    fn test_normalize_clears_unknown_defaults() {
        let mut s = SiteSettings::default();
        s.default_payment_method = "Bitcoin".into();
        s.default_delivery_date = "Yesterday".into();
        s.normalize();
        assert!(s.default_payment_method.is_empty());
        assert!(s.default_delivery_date.is_empty());
        assert_eq!(s.default_delivery_index(), 0);
        assert_eq!(s.default_payment().unwrap().name, "PayPal");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut s = SiteSettings::default();
        s.available_payment_methods.push(PaymentMethodOption::new("Stripe", dec!(1)));
        assert!(matches!(s.validate(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_shipping_for_threshold() {
        let d = DeliveryDateOption::new("Standard", 5, dec!(5), dec!(50));
        assert_eq!(d.shipping_for(dec!(49.99)), dec!(5));
        assert_eq!(d.shipping_for(dec!(50)), Decimal::ZERO);
    }

    #[test]
    fn test_currency_fallback() {
        let s = SiteSettings::default();
        assert_eq!(s.currency("eur").code, "EUR");
        assert_eq!(s.currency("XYZ").code, "USD");
    }

    #[test]
    fn test_from_json() {
        let raw = serde_json::to_string(&SiteSettings::default()).unwrap();
        let parsed = SiteSettings::from_json(&raw).unwrap();
        assert_eq!(parsed.available_delivery_dates.len(), 3);
        assert!(matches!(SiteSettings::from_json("{"), Err(SettingsError::Malformed(_))));
    }
}
