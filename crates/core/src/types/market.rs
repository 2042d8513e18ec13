//! Markets where purchases happen.

use serde::{Deserialize, Serialize};

use super::id::MarketId;
use super::name::NormalizedName;

/// A store registered in the market directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub name: NormalizedName,
}
