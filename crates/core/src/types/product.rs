//! Price history records and the best-price rule.
//!
//! A [`ProductPriceRecord`] keeps two independent tracks per product: the
//! best price paid at regular price and the best price paid on promotion.
//! Each purchase competes only against the track selected by its promotion
//! flag.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::name::NormalizedName;
use super::price::Price;

/// Which best-price track a purchase competes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrack {
    #[default]
    Regular,
    Promotional,
}

impl PriceTrack {
    /// Select the track from the purchase dialog's promotion flag.
    #[must_use]
    pub const fn from_promo(promo: bool) -> Self {
        if promo { Self::Promotional } else { Self::Regular }
    }

    #[must_use]
    pub const fn is_promo(self) -> bool {
        matches!(self, Self::Promotional)
    }
}

/// Rule deciding whether a new price replaces the stored best price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PriceRule {
    /// Replace only when the new price is strictly lower.
    #[default]
    Strict,
    /// Replace when the new price is lower or equal (the market follows the
    /// most recent purchase at the best price).
    LowerOrEqual,
}

impl PriceRule {
    /// Whether `candidate` should replace `current`.
    ///
    /// An empty track always accepts.
    #[must_use]
    pub fn accepts(self, candidate: Price, current: Option<Price>) -> bool {
        match (self, current) {
            (_, None) => true,
            (Self::Strict, Some(best)) => candidate < best,
            (Self::LowerOrEqual, Some(best)) => candidate <= best,
        }
    }
}

impl FromStr for PriceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "lower" => Ok(Self::Strict),
            "lower-or-equal" | "lower_or_equal" | "le" => Ok(Self::LowerOrEqual),
            other => Err(format!("unknown price rule: {other}")),
        }
    }
}

/// Best known price on one track, with the market it was paid at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestPrice {
    pub price: Price,
    pub market: NormalizedName,
}

/// A confirmed purchase of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub price: Price,
    pub market: NormalizedName,
    pub track: PriceTrack,
}

/// Result of applying a purchase to a price record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The purchase became the best price of its track.
    NewBest {
        track: PriceTrack,
        previous: Option<BestPrice>,
    },
    /// The stored best price of the track still stands.
    Unchanged { track: PriceTrack, best: BestPrice },
}

impl PurchaseOutcome {
    #[must_use]
    pub const fn is_new_best(&self) -> bool {
        matches!(self, Self::NewBest { .. })
    }
}

/// Price history of one product, keyed by its normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPriceRecord {
    pub id: ProductId,
    pub name: NormalizedName,
    pub best_regular: Option<BestPrice>,
    pub best_promo: Option<BestPrice>,
    pub last_purchased_at: Option<DateTime<Utc>>,
}

impl ProductPriceRecord {
    /// A record with no purchase applied yet.
    #[must_use]
    pub const fn empty(id: ProductId, name: NormalizedName) -> Self {
        Self {
            id,
            name,
            best_regular: None,
            best_promo: None,
            last_purchased_at: None,
        }
    }

    /// Best price of the given track.
    #[must_use]
    pub const fn best(&self, track: PriceTrack) -> Option<&BestPrice> {
        match track {
            PriceTrack::Regular => self.best_regular.as_ref(),
            PriceTrack::Promotional => self.best_promo.as_ref(),
        }
    }

    /// Whether any track holds a price.
    #[must_use]
    pub const fn has_prices(&self) -> bool {
        self.best_regular.is_some() || self.best_promo.is_some()
    }

    /// Apply a purchase to the record under `rule`.
    ///
    /// Only the purchase's track is touched, and only when the rule accepts
    /// the new price. `last_purchased_at` is left to the caller because the
    /// store assigns it.
    pub fn apply(&mut self, purchase: &Purchase, rule: PriceRule) -> PurchaseOutcome {
        let track = purchase.track;
        let slot = match track {
            PriceTrack::Regular => &mut self.best_regular,
            PriceTrack::Promotional => &mut self.best_promo,
        };

        match slot.as_ref() {
            Some(best) if !rule.accepts(purchase.price, Some(best.price)) => {
                PurchaseOutcome::Unchanged {
                    track,
                    best: best.clone(),
                }
            }
            _ => {
                let previous = slot.replace(BestPrice {
                    price: purchase.price,
                    market: purchase.market.clone(),
                });
                PurchaseOutcome::NewBest { track, previous }
            }
        }
    }
}
