//! Display hints derived from the price history.

use serde::{Deserialize, Serialize};

use super::price::CurrencyCode;
use super::product::{BestPrice, ProductPriceRecord};

/// What the price history knows about a product.
///
/// A product without a record (or whose record holds no price yet) is
/// [`PriceHint::NoHistory`]; `Known` always carries at least one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PriceHint {
    #[default]
    NoHistory,
    Known {
        regular: Option<BestPrice>,
        promo: Option<BestPrice>,
    },
}

impl PriceHint {
    /// Text shown for products without history.
    pub const NO_HISTORY_TEXT: &'static str = "New item. No price history yet.";

    /// Build the hint for an optional record.
    #[must_use]
    pub fn from_record(record: Option<&ProductPriceRecord>) -> Self {
        match record {
            Some(record) if record.has_prices() => Self::Known {
                regular: record.best_regular.clone(),
                promo: record.best_promo.clone(),
            },
            _ => Self::NoHistory,
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// One-line description for the shopping list.
    ///
    /// ```
    /// use shoplist_core::{CurrencyCode, PriceHint};
    ///
    /// assert_eq!(
    ///     PriceHint::NoHistory.describe(CurrencyCode::BRL),
    ///     "New item. No price history yet."
    /// );
    /// ```
    #[must_use]
    pub fn describe(&self, currency: CurrencyCode) -> String {
        match self {
            Self::NoHistory => Self::NO_HISTORY_TEXT.to_string(),
            Self::Known { regular, promo } => {
                let parts: Vec<String> = [
                    regular
                        .as_ref()
                        .map(|best| format!("Best price: {}", describe_best(best, currency))),
                    promo
                        .as_ref()
                        .map(|best| format!("Best promo: {}", describe_best(best, currency))),
                ]
                .into_iter()
                .flatten()
                .collect();
                parts.join(" · ")
            }
        }
    }
}

fn describe_best(best: &BestPrice, currency: CurrencyCode) -> String {
    format!(
        "{} at {}",
        best.price.display(currency),
        best.market.display_name()
    )
}
