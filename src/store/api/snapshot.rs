use crate::store::model::{DocumentKey, Timestamp};
use crate::store::value::{MapValue, Value};

/// Immutable point-in-time copy of one stored document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    version: u64,
    update_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: MapValue, version: u64, update_time: Timestamp) -> Self {
        Self {
            key,
            data: Some(data),
            version,
            update_time: Some(update_time),
        }
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(key: DocumentKey) -> Self {
        Self {
            key,
            data: None,
            version: 0,
            update_time: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&MapValue> {
        self.data.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(field))
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// Store write counter for this document; zero when it does not exist.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }

    /// Copy with `patch` merged into the data, as the store would hold it after an
    /// acknowledged update. Missing documents stay missing.
    pub(crate) fn patched(&self, patch: &MapValue) -> Self {
        let mut patched = self.clone();
        if let Some(data) = patched.data.as_mut() {
            data.merge(patch);
        }
        patched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_snapshot_reports_absence() {
        let key = DocumentKey::new("notes", "currentNote").unwrap();
        let snapshot = DocumentSnapshot::missing(key);
        assert!(!snapshot.exists());
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.get("note").is_none());
    }
}
