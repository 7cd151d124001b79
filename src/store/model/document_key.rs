use std::fmt::{self, Display, Formatter};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::store::error::{invalid_argument, StoreResult};

/// Address of a document: its collection name plus its id within that collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    collection: String,
    id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> StoreResult<Self> {
        let collection = collection.into();
        let id = id.into();
        validate_segment("collection name", &collection)?;
        validate_segment("document id", &id)?;
        Ok(Self { collection, id })
    }

    /// Parses a `collection/id` path.
    pub fn from_string(path: &str) -> StoreResult<Self> {
        let trimmed = path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((collection, id)) => Self::new(collection, id),
            None => Err(invalid_argument(format!(
                "Document path `{path}` must have the form collection/id"
            ))),
        }
    }

    /// Key with a freshly generated 20 character id.
    pub fn generate(collection: impl Into<String>) -> StoreResult<Self> {
        Self::new(collection, generate_auto_id())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn canonical_string(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(20)
        .collect()
}

fn validate_segment(label: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(invalid_argument(format!("{label} must not be empty")));
    }
    if value.contains('/') {
        return Err(invalid_argument(format!(
            "{label} `{value}` must not contain '/'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_paths_without_id() {
        let err = DocumentKey::from_string("inventory").unwrap_err();
        assert_eq!(err.code_str(), "store/invalid-argument");
    }

    #[test]
    fn parses_valid_path() {
        let key = DocumentKey::from_string("managerMessages/currentMessage").unwrap();
        assert_eq!(key.collection(), "managerMessages");
        assert_eq!(key.id(), "currentMessage");
        assert_eq!(key.to_string(), "managerMessages/currentMessage");
    }

    #[test]
    fn rejects_nested_ids() {
        assert!(DocumentKey::new("inventory", "a/b").is_err());
        assert!(DocumentKey::new("", "a").is_err());
    }
}
