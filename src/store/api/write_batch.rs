use std::fmt;
use std::sync::Arc;

use crate::store::datastore::{RemoteStore, WriteOperation};
use crate::store::error::{invalid_argument, resource_exhausted, StoreResult};
use crate::store::model::DocumentKey;
use crate::store::value::MapValue;

pub const MAX_BATCH_WRITES: usize = 500;

/// Aggregates write operations and commits them through one `batch_write` call.
#[derive(Clone)]
pub struct WriteBatch {
    store: Arc<dyn RemoteStore>,
    writes: Vec<WriteOperation>,
}

impl fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl WriteBatch {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            writes: Vec::new(),
        }
    }

    pub fn set(&mut self, key: DocumentKey, data: MapValue) -> StoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.writes.push(WriteOperation::Set { key, data });
        Ok(self)
    }

    pub fn update(&mut self, key: DocumentKey, data: MapValue) -> StoreResult<&mut Self> {
        self.ensure_capacity()?;
        if data.is_empty() {
            return Err(invalid_argument(format!(
                "Update of {key} must change at least one field"
            )));
        }
        self.writes.push(WriteOperation::Update { key, data });
        Ok(self)
    }

    pub fn delete(&mut self, key: DocumentKey) -> StoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.writes.push(WriteOperation::Delete { key });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commits all queued writes. An empty batch commits trivially.
    pub async fn commit(self) -> StoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.store.batch_write(self.writes).await
    }

    fn ensure_capacity(&self) -> StoreResult<()> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "WriteBatch cannot contain more than {MAX_BATCH_WRITES} operations"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::datastore::InMemoryStore;

    #[tokio::test]
    async fn commits_all_operations() {
        let store = Arc::new(InMemoryStore::new());
        let flour = DocumentKey::new("inventory", "flour").unwrap();
        let sugar = DocumentKey::new("inventory", "sugar").unwrap();

        let mut batch = WriteBatch::new(store.clone());
        batch
            .set(flour.clone(), MapValue::empty().with("current", 2i64))
            .unwrap()
            .set(sugar.clone(), MapValue::empty().with("current", 7i64))
            .unwrap();
        batch.commit().await.unwrap();

        let snapshot = store.get(&sugar).await.unwrap();
        assert_eq!(snapshot.get("current").and_then(|v| v.as_integer()), Some(7));
    }

    #[test]
    fn enforces_capacity() {
        let store = Arc::new(InMemoryStore::new());
        let mut batch = WriteBatch::new(store);
        for index in 0..MAX_BATCH_WRITES {
            let key = DocumentKey::new("checklists", format!("item-{index}")).unwrap();
            batch.delete(key).unwrap();
        }
        let overflow = DocumentKey::new("checklists", "one-too-many").unwrap();
        let err = batch.delete(overflow).unwrap_err();
        assert_eq!(err.code_str(), "store/resource-exhausted");
    }
}
