//! Query description and in-process evaluation.

use std::cmp::Ordering;

use super::value::FieldValue;
use super::{Collection, Document, Snapshot};

/// Sort direction of an `order_by` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Equality filter on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

/// A query over one collection.
///
/// Filters are combined with AND. Documents lacking the `order_by` field are
/// excluded from ordered results, as hosted document stores do.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    /// All documents of a collection.
    #[must_use]
    pub const fn collection(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Add an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Order results by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Order results by a field, ascending.
    #[must_use]
    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(field, Direction::Ascending)
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document passes the filters (and has the ordering field).
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        let filtered = self
            .filters
            .iter()
            .all(|filter| document.get(&filter.field) == Some(&filter.value));
        let ordered = self
            .order_by
            .as_ref()
            .is_none_or(|(field, _)| document.get(field).is_some());
        filtered && ordered
    }

    /// Evaluate the query against a set of documents.
    ///
    /// Ties in the ordering field are broken by document ID so results are
    /// deterministic.
    #[must_use]
    pub fn evaluate(&self, documents: impl IntoIterator<Item = Document>) -> Snapshot {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|document| self.matches(document))
            .collect();

        match &self.order_by {
            Some((field, direction)) => matched.sort_by(|a, b| {
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => x.query_cmp(y),
                    _ => Ordering::Equal,
                };
                let ordering = match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            }),
            None => matched.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        Snapshot::new(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentId, Fields};

    fn doc(id: &str, name: &str, rank: Option<i64>) -> Document {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::from(name));
        if let Some(rank) = rank {
            fields.insert("rank".into(), FieldValue::Integer(rank));
        }
        Document {
            id: DocumentId::new(id),
            fields,
            update_time: None,
        }
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_where_eq_filters() {
        let query = Query::collection(Collection::Products).where_eq("name", "milk");
        let snapshot = query.evaluate(vec![doc("a", "milk", None), doc("b", "eggs", None)]);
        assert_eq!(ids(&snapshot), vec!["a"]);
    }

    #[test]
    fn test_order_by_and_limit() {
        let docs = vec![
            doc("a", "x", Some(3)),
            doc("b", "y", Some(1)),
            doc("c", "z", Some(2)),
        ];
        let asc = Query::collection(Collection::Products).order_by_asc("rank");
        assert_eq!(ids(&asc.evaluate(docs.clone())), vec!["b", "c", "a"]);

        let desc = Query::collection(Collection::Products)
            .order_by("rank", Direction::Descending)
            .limit(2);
        assert_eq!(ids(&desc.evaluate(docs)), vec!["a", "c"]);
    }

    #[test]
    fn test_order_by_excludes_documents_without_field() {
        let query = Query::collection(Collection::Products).order_by_asc("rank");
        let snapshot = query.evaluate(vec![doc("a", "x", None), doc("b", "y", Some(1))]);
        assert_eq!(ids(&snapshot), vec!["b"]);
    }
}
