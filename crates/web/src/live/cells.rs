//! Snapshot-derived state held in the sync engine's watch cells.

use std::collections::{BTreeMap, HashMap};

use shoplist_core::{ItemId, NormalizedName, PriceHint, ProductPriceRecord, ShoppingListItem};

/// Price history keyed by normalized name.
///
/// Rebuilt from scratch on every price-history snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceCache {
    records: BTreeMap<NormalizedName, ProductPriceRecord>,
}

impl PriceCache {
    /// Build the cache from decoded records.
    ///
    /// Should the store hold two records for one name, the first wins.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = ProductPriceRecord>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.entry(record.name.clone()).or_insert(record);
        }
        Self { records: map }
    }

    #[must_use]
    pub fn get(&self, name: &NormalizedName) -> Option<&ProductPriceRecord> {
        self.records.get(name)
    }

    /// Best-price hint for a product. Pure lookup.
    #[must_use]
    pub fn best_price_hint(&self, name: &NormalizedName) -> PriceHint {
        PriceHint::from_record(self.get(name))
    }

    /// Records sorted by name.
    pub fn records(&self) -> impl Iterator<Item = &ProductPriceRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The active shopping list as of the latest list snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveItems {
    items: Vec<ShoppingListItem>,
    names: HashMap<NormalizedName, usize>,
}

impl ActiveItems {
    /// Build from items in display order.
    #[must_use]
    pub fn new(items: Vec<ShoppingListItem>) -> Self {
        let mut names = HashMap::new();
        for item in &items {
            *names.entry(item.name.clone()).or_insert(0) += 1;
        }
        Self { items, names }
    }

    #[must_use]
    pub fn contains(&self, name: &NormalizedName) -> bool {
        self.names.contains_key(name)
    }

    /// Items in display order.
    #[must_use]
    pub fn items(&self) -> &[ShoppingListItem] {
        &self.items
    }

    #[must_use]
    pub fn find(&self, id: &ItemId) -> Option<&ShoppingListItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Names present more than once.
    pub fn duplicated_names(&self) -> impl Iterator<Item = &NormalizedName> {
        self.names
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(name, _)| name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Where a claimed add stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimState {
    /// The write has not returned yet.
    InFlight,
    /// The write landed; the next list snapshot reflects it.
    Written,
}

/// Names claimed by adds whose item no list snapshot has shown yet.
///
/// A claim settles on the first list snapshot that contains the name, or on
/// the first list snapshot applied after its write landed, whether or not
/// the name is in it. The latter covers items removed before any snapshot
/// showed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAdds {
    claims: BTreeMap<NormalizedName, ClaimState>,
}

impl PendingAdds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &NormalizedName) -> bool {
        self.claims.contains_key(name)
    }

    /// Claim `name`. Returns `false` if it was already claimed.
    pub fn insert(&mut self, name: NormalizedName) -> bool {
        if self.claims.contains_key(&name) {
            return false;
        }
        self.claims.insert(name, ClaimState::InFlight);
        true
    }

    /// Drop the claim on `name`. Returns `false` if there was none.
    pub fn remove(&mut self, name: &NormalizedName) -> bool {
        self.claims.remove(name).is_some()
    }

    /// Record that the write of `name` landed.
    pub fn mark_written(&mut self, name: &NormalizedName) {
        if let Some(state) = self.claims.get_mut(name) {
            *state = ClaimState::Written;
        }
    }

    /// Drop the claims a list snapshot settles. Returns whether any was
    /// dropped.
    pub fn settle(&mut self, active: &ActiveItems) -> bool {
        let before = self.claims.len();
        self.claims
            .retain(|name, state| *state == ClaimState::InFlight && !active.contains(name));
        self.claims.len() != before
    }

    pub fn names(&self) -> impl Iterator<Item = &NormalizedName> {
        self.claims.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl FromIterator<NormalizedName> for PendingAdds {
    fn from_iter<I: IntoIterator<Item = NormalizedName>>(names: I) -> Self {
        Self {
            claims: names
                .into_iter()
                .map(|name| (name, ClaimState::InFlight))
                .collect(),
        }
    }
}

/// Outcome of claiming a name for an add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    AlreadyActive,
    AlreadyPending,
}
