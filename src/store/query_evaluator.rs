use std::cmp::Ordering;

use crate::store::api::{DocumentSnapshot, FieldFilter, FilterOperator, OrderBy, OrderDirection, Query};
use crate::store::value::{MapValue, Value, ValueKind};

/// Field path addressing the document id in filters and orderings.
pub const DOCUMENT_ID_FIELD: &str = "__name__";

/// Applies the query to a set of candidate documents and returns the filtered,
/// ordered, and bounded result set.
///
/// Documents that tie on every ordering fall back to id order so repeated evaluations
/// of the same data always agree.
pub(crate) fn apply_query_to_documents(
    documents: Vec<DocumentSnapshot>,
    query: &Query,
) -> Vec<DocumentSnapshot> {
    let mut filtered: Vec<DocumentSnapshot> = documents
        .into_iter()
        .filter(|snapshot| snapshot.exists())
        .filter(|snapshot| query.matches_collection(snapshot.key()))
        .filter(|snapshot| document_satisfies_filters(snapshot, query.filters()))
        .collect();

    filtered.sort_by(|left, right| {
        compare_snapshots(left, right, query.order_by_clauses())
            .then_with(|| left.id().cmp(right.id()))
    });

    if let Some(limit) = query.limit() {
        filtered.truncate(limit as usize);
    }

    filtered
}

fn document_satisfies_filters(snapshot: &DocumentSnapshot, filters: &[FieldFilter]) -> bool {
    filters
        .iter()
        .all(|filter| match get_field_value(snapshot, filter.field()) {
            Some(value) => evaluate_filter(filter, &value),
            None => match filter.operator() {
                FilterOperator::NotEqual => evaluate_filter(filter, &Value::null()),
                _ => false,
            },
        })
}

fn evaluate_filter(filter: &FieldFilter, value: &Value) -> bool {
    match filter.operator() {
        FilterOperator::Equal => values_equal(value, filter.value()),
        FilterOperator::NotEqual => !values_equal(value, filter.value()),
        FilterOperator::LessThan => compare_values(value, filter.value()) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => {
            compare_values(value, filter.value()) == Some(Ordering::Greater)
        }
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(items) => items.iter().any(|item| values_equal(item, filter.value())),
            _ => false,
        },
        FilterOperator::In => match filter.value().kind() {
            ValueKind::Array(needles) => needles.iter().any(|needle| values_equal(needle, value)),
            _ => false,
        },
    }
}

fn get_field_value(snapshot: &DocumentSnapshot, field: &str) -> Option<Value> {
    if field == DOCUMENT_ID_FIELD {
        return Some(Value::from_string(snapshot.id()));
    }

    let map = snapshot.data()?;
    let segments: Vec<&str> = field.split('.').collect();
    find_in_map(map, &segments).cloned()
}

fn find_in_map<'a>(map: &'a MapValue, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let value = map.get(first)?;
    if rest.is_empty() {
        Some(value)
    } else if let ValueKind::Map(child) = value.kind() {
        find_in_map(child, rest)
    } else {
        None
    }
}

fn compare_snapshots(left: &DocumentSnapshot, right: &DocumentSnapshot, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left_value = get_field_value(left, order.field()).unwrap_or_else(Value::null);
        let right_value = get_field_value(right, order.field()).unwrap_or_else(Value::null);

        let mut ordering = compare_values(&left_value, &right_value)
            .unwrap_or_else(|| type_rank(&left_value).cmp(&type_rank(&right_value)));
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Orders two values of comparable kinds; `None` when the kinds cannot be compared.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality that treats `12` and `12.0` as the same number.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.kind(), right.kind()) {
        (ValueKind::Integer(_), ValueKind::Double(_))
        | (ValueKind::Double(_), ValueKind::Integer(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

// Cross-kind ordering puts missing values first, matching how unset fields sort.
fn type_rank(value: &Value) -> u8 {
    match value.kind() {
        ValueKind::Null => 0,
        ValueKind::Boolean(_) => 1,
        ValueKind::Integer(_) | ValueKind::Double(_) => 2,
        ValueKind::Timestamp(_) => 3,
        ValueKind::String(_) => 4,
        ValueKind::Array(_) => 5,
        ValueKind::Map(_) => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{DocumentKey, Timestamp};

    fn snapshot_for(id: &str, fields: MapValue) -> DocumentSnapshot {
        let key = DocumentKey::new("checklists", id).unwrap();
        DocumentSnapshot::new(key, fields, 1, Timestamp::new(1, 0))
    }

    #[test]
    fn filters_orders_and_limits() {
        let query = Query::new("checklists")
            .unwrap()
            .where_eq("category", "Opening")
            .order_by_asc("order")
            .with_limit(2);

        let docs = vec![
            snapshot_for("lights", MapValue::empty().with("category", "Opening").with("order", 3i64)),
            snapshot_for("till", MapValue::empty().with("category", "Closing").with("order", 1i64)),
            snapshot_for("doors", MapValue::empty().with("category", "Opening").with("order", 1i64)),
            snapshot_for("coffee", MapValue::empty().with("category", "Opening").with("order", 2.0)),
        ];

        let result = apply_query_to_documents(docs, &query);
        let ids: Vec<&str> = result.iter().map(|doc| doc.id()).collect();
        assert_eq!(ids, vec!["doors", "coffee"]);
    }

    #[test]
    fn missing_order_field_sorts_first() {
        let query = Query::new("checklists").unwrap().order_by_asc("order");
        let docs = vec![
            snapshot_for("b", MapValue::empty().with("order", 1i64)),
            snapshot_for("a", MapValue::empty()),
        ];

        let result = apply_query_to_documents(docs, &query);
        assert_eq!(result[0].id(), "a");
    }

    #[test]
    fn numeric_equality_crosses_integer_and_double() {
        assert!(values_equal(&Value::from_integer(12), &Value::from_double(12.0)));
        assert!(!values_equal(&Value::from_integer(12), &Value::from_string("12")));
    }

    #[test]
    fn array_contains_matches_members() {
        let query = Query::new("checklists")
            .unwrap()
            .where_field("staff", FilterOperator::ArrayContains, "dana");
        let docs = vec![
            snapshot_for("x", MapValue::empty().with("staff", Value::from_strings(["dana", "li"]))),
            snapshot_for("y", MapValue::empty().with("staff", Value::from_strings(["li"]))),
        ];
        let result = apply_query_to_documents(docs, &query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "x");
    }
}
