//! Shopping-list entries.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ItemId;
use super::name::NormalizedName;

/// An active entry of the shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: ItemId,
    pub name: NormalizedName,
    /// Assigned by the store when the item is written.
    pub created_at: DateTime<Utc>,
}

/// Ordering of the live shopping list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    /// Oldest entries first (the order items were added).
    #[default]
    OldestFirst,
    NewestFirst,
}

impl ListOrder {
    /// Form value for this ordering.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OldestFirst => "oldest",
            Self::NewestFirst => "newest",
        }
    }
}

impl FromStr for ListOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" | "oldest_first" => Ok(Self::OldestFirst),
            "newest" | "newest_first" => Ok(Self::NewestFirst),
            other => Err(format!("unknown list order: {other}")),
        }
    }
}
