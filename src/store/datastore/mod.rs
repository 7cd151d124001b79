use std::sync::Arc;

use async_trait::async_trait;

use crate::store::api::{DocumentSnapshot, Query, QuerySnapshot};
use crate::store::error::StoreResult;
use crate::store::model::DocumentKey;
use crate::store::value::MapValue;
use crate::util::{ListenerRegistration, PartialObserver};

pub mod in_memory;

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Replaces the whole document, creating it when absent.
    Set { key: DocumentKey, data: MapValue },
    /// Overwrites only the listed fields; fails when the document is absent.
    Update { key: DocumentKey, data: MapValue },
    Delete { key: DocumentKey },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Set { key, .. }
            | WriteOperation::Update { key, .. }
            | WriteOperation::Delete { key } => key,
        }
    }
}

/// Client of the remote document database.
///
/// Every call may fail with a transport error. `subscribe` must deliver the current
/// result set to the observer before it returns and then again after every change to
/// the matching documents.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get(&self, key: &DocumentKey) -> StoreResult<DocumentSnapshot>;

    async fn list(&self, query: &Query) -> StoreResult<QuerySnapshot>;

    async fn subscribe(
        &self,
        query: &Query,
        observer: PartialObserver<QuerySnapshot>,
    ) -> StoreResult<ListenerRegistration>;

    /// Creates a document with a generated id.
    async fn add(&self, collection: &str, data: MapValue) -> StoreResult<DocumentKey>;

    async fn set(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()>;

    /// Field-level overwrite of an existing document.
    async fn update(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()>;

    async fn delete(&self, key: &DocumentKey) -> StoreResult<()>;

    async fn batch_write(&self, writes: Vec<WriteOperation>) -> StoreResult<()>;

    /// Whether `batch_write` applies all writes or none. Stores returning `false` get
    /// compensating writes from the write coordinator instead.
    fn supports_atomic_batch(&self) -> bool {
        true
    }
}

pub type RemoteStoreArc = Arc<dyn RemoteStore>;

pub use in_memory::InMemoryStore;
