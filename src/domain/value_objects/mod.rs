//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Round a monetary amount to cents, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Player identifier attached to top-up style cart lines.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(value: impl Into<String>) -> Result<Self, PlayerIdError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(PlayerIdError::Missing); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) { return Err(PlayerIdError::InvalidCharacters); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for PlayerId {
    type Error = PlayerIdError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PlayerId> for String {
    fn from(value: PlayerId) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerIdError {
    #[error("Player ID is required")]
    Missing,
    #[error("Player ID must contain only letters and numbers")]
    InvalidCharacters,
}

/// Display currency with its conversion rate from the store's base currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub name: String,
    pub code: String,
    pub symbol: String,
    pub convert_rate: Decimal,
}

impl Currency {
    pub fn new(name: impl Into<String>, code: impl Into<String>, symbol: impl Into<String>, convert_rate: Decimal) -> Self {
        Self { name: name.into(), code: code.into(), symbol: symbol.into(), convert_rate }
    }

    /// Base currency, rate 1.
    pub fn usd() -> Self { Self::new("United States Dollar", "USD", "$", Decimal::ONE) }

    /// Converts a base-currency price into this currency, rounded to cents.
    pub fn convert(&self, base_price: Decimal) -> Decimal { round2(base_price * self.convert_rate) }

    /// Formats a base-currency price for display, e.g. `$1,234.50`.
    ///
    /// Output depends only on the inputs: no locale lookup happens here.
    pub fn format(&self, base_price: Decimal) -> String {
        format_amount(&self.symbol, self.convert(base_price))
    }
}

impl Default for Currency { fn default() -> Self { Self::usd() } }

fn format_amount(symbol: &str, amount: Decimal) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    let mut fixed = amount.abs();
    fixed.rescale(2);
    let text = fixed.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 { grouped.push(','); }
        grouped.push(ch);
    }
    format!("{sign}{symbol}{grouped}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_player_id() {
        let id = PlayerId::new("  abc123 ").unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(PlayerId::new("   "), Err(PlayerIdError::Missing));
        assert_eq!(PlayerId::new("abc-123"), Err(PlayerIdError::InvalidCharacters));
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(dec!(0.125)), dec!(0.13));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
        assert_eq!(round2(dec!(39.98)), dec!(39.98));
    }

    #[test]
    fn test_format_base_currency() {
        assert_eq!(Currency::usd().format(dec!(19.99)), "$19.99");
        assert_eq!(Currency::usd().format(dec!(5)), "$5.00");
        assert_eq!(Currency::usd().format(Decimal::ZERO), "$0.00");
    }

    #[test]
    fn test_format_converts_and_groups() {
        let eur = Currency::new("Euro", "EUR", "€", dec!(0.9));
        assert_eq!(eur.format(dec!(1000)), "€900.00");
        assert_eq!(eur.convert(dec!(19.99)), dec!(17.99));

        let aed = Currency::new("UAE Dirham", "AED", "AED ", dec!(3.67));
        assert_eq!(aed.format(dec!(1234.5)), "AED 4,530.62");
    }

    #[test]
    fn test_format_is_pure() {
        let eur = Currency::new("Euro", "EUR", "€", dec!(0.9));
        let price = dec!(10.10);
        assert_eq!(eur.format(price), eur.format(price));
        assert_eq!(price, dec!(10.10));
        assert_eq!(eur.convert_rate, dec!(0.9));
    }

    #[test]
    fn test_format_negative() {
        assert_eq!(Currency::usd().format(dec!(-1234.5)), "-$1,234.50");
    }
}
