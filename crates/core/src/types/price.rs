//! Type-safe price representation using decimal arithmetic.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is empty.
    #[error("price cannot be empty")]
    Empty,
    /// The input is not a number.
    #[error("price is not a number: {0}")]
    Invalid(String),
    /// The amount is zero or negative.
    #[error("price must be greater than zero")]
    NotPositive,
}

/// A strictly positive amount paid for a product.
///
/// Amounts are kept as exact decimals and serialized as strings so that
/// comparisons between stored best prices never suffer float rounding.
///
/// ## Examples
///
/// ```
/// use shoplist_core::Price;
///
/// let price = Price::parse("3,50").unwrap();
/// assert_eq!(price.to_string(), "3.50");
/// assert!(Price::parse("0").is_err());
/// assert!(Price::parse("abc").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotPositive` if the amount is zero or negative.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount <= Decimal::ZERO {
            return Err(PriceError::NotPositive);
        }
        Ok(Self(amount.normalize()))
    }

    /// Parse a price typed by a user.
    ///
    /// Both `.` and `,` are accepted as the decimal separator.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, not a number, or not positive.
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PriceError::Empty);
        }

        let amount = Decimal::from_str(&trimmed.replace(',', "."))
            .map_err(|_| PriceError::Invalid(trimmed.to_string()))?;

        Self::new(amount)
    }

    /// The amount in the currency's standard unit.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Format for display with a currency symbol (e.g., "R$ 3.50").
    #[must_use]
    pub fn display(&self, currency: CurrencyCode) -> String {
        format!("{} {self}", currency.symbol())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

/// ISO 4217 currency codes used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    BRL,
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Currency symbol shown next to amounts.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::BRL => "R$",
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// ISO 4217 code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BRL => "BRL",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BRL" => Ok(Self::BRL),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "CAD" => Ok(Self::CAD),
            "AUD" => Ok(Self::AUD),
            other => Err(format!("unsupported currency code: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parse_accepts_both_separators() {
        assert_eq!(Price::parse("3.50").unwrap(), Price::parse("3,5").unwrap());
        assert_eq!(Price::parse(" 12 ").unwrap().amount(), Decimal::new(12, 0));
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert_eq!(Price::parse(""), Err(PriceError::Empty));
        assert_eq!(Price::parse("-1"), Err(PriceError::NotPositive));
        assert_eq!(Price::parse("0.00"), Err(PriceError::NotPositive));
        assert!(matches!(Price::parse("three"), Err(PriceError::Invalid(_))));
    }

    #[test]
    fn test_display_uses_two_decimals() {
        assert_eq!(Price::parse("2.9").unwrap().to_string(), "2.90");
        assert_eq!(
            Price::parse("4").unwrap().display(CurrencyCode::BRL),
            "R$ 4.00"
        );
    }

    #[test]
    fn test_ordering_is_numeric() {
        let cheap = Price::parse("2.99").unwrap();
        let pricey = Price::parse("10").unwrap();
        assert!(cheap < pricey);
        assert_eq!(Price::parse("3.5").unwrap(), Price::parse("3.50").unwrap());
    }

    #[test]
    fn test_serde_round_trips_as_string() {
        let price = Price::parse("3.50").unwrap();
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"3.5\"");
        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
        assert!(serde_json::from_str::<Price>("\"-2\"").is_err());
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("usd".parse::<CurrencyCode>(), Ok(CurrencyCode::USD));
        assert!("XYZ".parse::<CurrencyCode>().is_err());
        assert_eq!(CurrencyCode::default().symbol(), "R$");
    }
}
