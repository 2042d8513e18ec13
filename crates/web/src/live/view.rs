//! The combined view derived from the state cells.

use shoplist_core::{BestPrice, ItemId, ListOrder, NormalizedName, PriceHint, ProductId};

use super::cells::{ActiveItems, PendingAdds, PriceCache};

/// One row of the shopping list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub id: ItemId,
    pub name: NormalizedName,
    pub hint: PriceHint,
}

/// One toggle of the history panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: ProductId,
    pub name: NormalizedName,
    pub regular: Option<BestPrice>,
    pub promo: Option<BestPrice>,
    /// False while the product is on the list or being added.
    pub enabled: bool,
}

/// Everything the page renders, recomputed whenever an input cell changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveView {
    /// Bumped on every recomputation.
    pub version: u64,
    pub order: ListOrder,
    pub list: Vec<ListEntry>,
    pub history: Vec<HistoryEntry>,
    /// Last subscription error, cleared by the next good snapshot.
    pub sync_error: Option<String>,
}

/// Inputs of a derivation.
pub struct ViewInputs<'a> {
    pub prices: &'a PriceCache,
    pub active: &'a ActiveItems,
    pub pending: &'a PendingAdds,
    pub order: ListOrder,
    pub sync_error: Option<&'a str>,
}

impl LiveView {
    /// Derive the view. Tolerates any interleaving of list and price
    /// snapshots: every input is read as-is.
    #[must_use]
    pub fn derive(version: u64, inputs: &ViewInputs<'_>) -> Self {
        let mut items: Vec<_> = inputs.active.items().iter().collect();
        // a snapshot of the previous ordering may still be in the cell
        match inputs.order {
            ListOrder::OldestFirst => items.sort_by_key(|item| item.created_at),
            ListOrder::NewestFirst => items.sort_by_key(|item| std::cmp::Reverse(item.created_at)),
        }
        let list = items
            .into_iter()
            .map(|item| ListEntry {
                id: item.id.clone(),
                name: item.name.clone(),
                hint: inputs.prices.best_price_hint(&item.name),
            })
            .collect();

        let history = inputs
            .prices
            .records()
            .map(|record| HistoryEntry {
                id: record.id.clone(),
                name: record.name.clone(),
                regular: record.best_regular.clone(),
                promo: record.best_promo.clone(),
                enabled: !inputs.active.contains(&record.name)
                    && !inputs.pending.contains(&record.name),
            })
            .collect();

        Self {
            version,
            order: inputs.order,
            list,
            history,
            sync_error: inputs.sync_error.map(str::to_string),
        }
    }

    /// Whether the history toggle of `name` is enabled. `None` if the
    /// product has no history.
    #[must_use]
    pub fn history_enabled(&self, name: &NormalizedName) -> Option<bool> {
        self.history
            .iter()
            .find(|entry| &entry.name == name)
            .map(|entry| entry.enabled)
    }

    /// Whether `name` is on the rendered list.
    #[must_use]
    pub fn lists(&self, name: &NormalizedName) -> bool {
        self.list.iter().any(|entry| &entry.name == name)
    }
}
