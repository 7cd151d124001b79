use std::fmt::Write as _;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::model::DocumentKey;
use crate::store::value::Value;

use super::snapshot::DocumentSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
}

impl FilterOperator {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::In => "in",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: String,
    operator: FilterOperator,
    value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// A query over one collection: field filters, ordering and an optional limit.
///
/// Filters are combined with AND. Documents missing an ordered field sort as null.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    collection: String,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    limit: Option<u32>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> StoreResult<Self> {
        let collection = collection.into();
        if collection.is_empty() || collection.contains('/') {
            return Err(invalid_argument(format!(
                "`{collection}` is not a valid collection name"
            )));
        }
        Ok(Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn order_by_clauses(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn where_field(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(FieldFilter::new(field, operator, value));
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_field(field, FilterOperator::Equal, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn order_by_asc(self, field: impl Into<String>) -> Self {
        self.order_by(field, OrderDirection::Ascending)
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches_collection(&self, key: &DocumentKey) -> bool {
        key.collection() == self.collection
    }

    /// Stable textual identity of the query, used to tell two subscriptions apart.
    pub fn canonical_id(&self) -> String {
        let mut id = self.collection.clone();
        for filter in &self.filters {
            let _ = write!(
                id,
                "|where:{}{}{:?}",
                filter.field,
                filter.operator.as_str(),
                filter.value
            );
        }
        for order in &self.order_by {
            let direction = match order.direction {
                OrderDirection::Ascending => "asc",
                OrderDirection::Descending => "desc",
            };
            let _ = write!(id, "|order:{}:{direction}", order.field);
        }
        if let Some(limit) = self.limit {
            let _ = write!(id, "|limit:{limit}");
        }
        id
    }
}

/// The full, ordered result of a query at one point in time.
///
/// `sequence` increases with every delivery to the same listener, letting receivers
/// drop deliveries that arrive out of order.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<DocumentSnapshot>,
    sequence: u64,
}

impl QuerySnapshot {
    pub fn new(query: Query, documents: Vec<DocumentSnapshot>, sequence: u64) -> Self {
        Self {
            query,
            documents,
            sequence,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn into_documents(self) -> Vec<DocumentSnapshot> {
        self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_distinguishes_filters() {
        let opening = Query::new("checklists")
            .unwrap()
            .where_eq("category", "Opening")
            .order_by_asc("order");
        let closing = Query::new("checklists")
            .unwrap()
            .where_eq("category", "Closing")
            .order_by_asc("order");
        assert_ne!(opening.canonical_id(), closing.canonical_id());
        assert_eq!(opening.canonical_id(), opening.clone().canonical_id());
    }

    #[test]
    fn rejects_document_paths() {
        let err = Query::new("inventory/flour").unwrap_err();
        assert_eq!(err.code_str(), "store/invalid-argument");
    }
}
