use crate::store::error::{validation, StoreError, StoreResult};
use crate::store::model::Timestamp;
use crate::store::value::{MapValue, Value};

use super::query::QuerySnapshot;
use super::snapshot::DocumentSnapshot;

/// Strongly typed shape of the documents in one collection.
///
/// Reads go through `from_fields`, which is where untyped store data gets validated;
/// writes go through `to_fields`.
pub trait DocumentModel: Clone + Send + Sync + 'static {
    /// Name of the collection holding documents of this shape.
    fn collection() -> &'static str;

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self>;

    fn to_fields(&self) -> MapValue;

    fn from_snapshot(snapshot: &DocumentSnapshot) -> StoreResult<Self> {
        match snapshot.data() {
            Some(fields) => Self::from_fields(snapshot.id(), fields),
            None => Err(crate::store::error::not_found(format!(
                "Document {} does not exist",
                snapshot.key()
            ))),
        }
    }
}

/// Decodes every document, splitting successes from documents that failed validation.
pub fn decode_documents<'a, M, I>(documents: I) -> (Vec<M>, Vec<StoreError>)
where
    M: DocumentModel,
    I: IntoIterator<Item = (&'a str, &'a MapValue)>,
{
    let mut decoded = Vec::new();
    let mut errors = Vec::new();
    for (id, fields) in documents {
        match M::from_fields(id, fields) {
            Ok(model) => decoded.push(model),
            Err(err) => {
                log::warn!("skipping malformed {} document {id}: {err}", M::collection());
                errors.push(err);
            }
        }
    }
    (decoded, errors)
}

/// Decodes the existing documents of a query result, skipping malformed ones.
pub fn decode_snapshot<M: DocumentModel>(snapshot: &QuerySnapshot) -> Vec<M> {
    decode_documents(
        snapshot
            .documents()
            .iter()
            .filter_map(|doc| doc.data().map(|data| (doc.id(), data))),
    )
    .0
}

/// Typed accessors over a document body with uniform validation messages.
///
/// Missing and null fields read as `None`; a present field of the wrong type is a
/// validation error.
pub struct FieldReader<'a> {
    location: String,
    fields: &'a MapValue,
}

impl<'a> FieldReader<'a> {
    pub fn new(collection: &str, id: &str, fields: &'a MapValue) -> Self {
        Self {
            location: format!("{collection}/{id}"),
            fields,
        }
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    fn mismatch(&self, field: &str, expected: &str, value: &Value) -> StoreError {
        validation(format!(
            "field `{field}` of {} must be {expected}, found {}",
            self.location,
            value.type_name()
        ))
    }

    pub fn string(&self, field: &str) -> StoreResult<Option<String>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.mismatch(field, "a string", value)),
        }
    }

    /// String field defaulting to empty when absent.
    pub fn text(&self, field: &str) -> StoreResult<String> {
        Ok(self.string(field)?.unwrap_or_default())
    }

    pub fn required_string(&self, field: &str) -> StoreResult<String> {
        self.string(field)?.ok_or_else(|| {
            validation(format!(
                "field `{field}` of {} is required",
                self.location
            ))
        })
    }

    /// Integer field; whole doubles are accepted since clients may write either.
    pub fn integer(&self, field: &str) -> StoreResult<Option<i64>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => match (value.as_integer(), value.as_f64()) {
                (Some(integer), _) => Ok(Some(integer)),
                (None, Some(double)) if double.fract() == 0.0 => Ok(Some(double as i64)),
                _ => Err(self.mismatch(field, "an integer", value)),
            },
        }
    }

    pub fn number(&self, field: &str) -> StoreResult<Option<f64>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, "a number", value)),
        }
    }

    pub fn boolean(&self, field: &str) -> StoreResult<bool> {
        match self.present(field) {
            None => Ok(false),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.mismatch(field, "a boolean", value)),
        }
    }

    pub fn timestamp(&self, field: &str) -> StoreResult<Option<Timestamp>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_timestamp()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, "a timestamp", value)),
        }
    }

    pub fn string_list(&self, field: &str) -> StoreResult<Vec<String>> {
        match self.present(field) {
            None => Ok(Vec::new()),
            Some(value) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.mismatch(field, "an array", value))?;
                items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| self.mismatch(field, "an array of strings", item))
                    })
                    .collect()
            }
        }
    }

    pub fn maps(&self, field: &str) -> StoreResult<Vec<&'a MapValue>> {
        match self.present(field) {
            None => Ok(Vec::new()),
            Some(value) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.mismatch(field, "an array", value))?;
                items
                    .iter()
                    .map(|item| {
                        item.as_map()
                            .ok_or_else(|| self.mismatch(field, "an array of maps", item))
                    })
                    .collect()
            }
        }
    }

    pub fn map(&self, field: &str) -> StoreResult<Option<&'a MapValue>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_map()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, "a map", value)),
        }
    }

    /// Reader over a nested map, reporting errors with the parent location.
    pub fn nested(&self, field: &str, fields: &'a MapValue) -> FieldReader<'a> {
        FieldReader {
            location: format!("{}.{field}", self.location),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_type_mismatch_with_location() {
        let fields = MapValue::empty().with("par", "lots");
        let reader = FieldReader::new("inventory", "flour", &fields);
        let err = reader.integer("par").unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("inventory/flour"));
    }

    #[test]
    fn null_reads_as_absent() {
        let fields = MapValue::empty().with("notes", Value::null()).with("par", 12.0);
        let reader = FieldReader::new("inventory", "flour", &fields);
        assert_eq!(reader.string("notes").unwrap(), None);
        assert_eq!(reader.integer("par").unwrap(), Some(12));
        assert!(!reader.boolean("complete").unwrap());
    }
}
