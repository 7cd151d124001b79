#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cafe_sync::store::error::unavailable;
use cafe_sync::store::{
    DocumentKey, DocumentSnapshot, InMemoryStore, MapValue, Query, QuerySnapshot, RemoteStore, StoreResult,
    WriteOperation,
};
use cafe_sync::util::{ListenerRegistration, PartialObserver};

/// Store whose listeners are driven by the test instead of by writes, and whose
/// batches may be non-atomic with a failure injected at a given update.
pub struct ScriptedStore {
    pub backing: InMemoryStore,
    observers: Mutex<Vec<(Query, PartialObserver<QuerySnapshot>)>>,
    atomic: bool,
    relay: bool,
    updates: AtomicUsize,
    fail_update_at: Mutex<Option<usize>>,
}

impl ScriptedStore {
    pub fn new(atomic: bool) -> Arc<Self> {
        Self::build(atomic, false)
    }

    /// Like [`ScriptedStore::new`], but listeners hear every write as it lands.
    pub fn relaying(atomic: bool) -> Arc<Self> {
        Self::build(atomic, true)
    }

    fn build(atomic: bool, relay: bool) -> Arc<Self> {
        Arc::new(Self {
            backing: InMemoryStore::new(),
            observers: Mutex::new(Vec::new()),
            atomic,
            relay,
            updates: AtomicUsize::new(0),
            fail_update_at: Mutex::new(None),
        })
    }

    /// The `index`-th update from now (zero based) fails with a transport error.
    pub fn fail_update(&self, index: usize) {
        let base = self.updates.load(Ordering::SeqCst);
        *self.fail_update_at.lock().unwrap() = Some(base + index);
    }

    /// Delivers `documents` to every listener with the given sequence number.
    pub fn push(&self, documents: Vec<DocumentSnapshot>, sequence: u64) {
        let observers = self.observers.lock().unwrap().clone();
        for (query, observer) in observers {
            observer.notify_next(&QuerySnapshot::new(query, documents.clone(), sequence));
        }
    }

    pub fn listener_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn get(&self, key: &DocumentKey) -> StoreResult<DocumentSnapshot> {
        self.backing.get(key).await
    }

    async fn list(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        self.backing.list(query).await
    }

    async fn subscribe(
        &self,
        query: &Query,
        observer: PartialObserver<QuerySnapshot>,
    ) -> StoreResult<ListenerRegistration> {
        if self.relay {
            return self.backing.subscribe(query, observer).await;
        }
        let current = self.backing.list(query).await?.into_documents();
        observer.notify_next(&QuerySnapshot::new(query.clone(), current, 1));
        self.observers.lock().unwrap().push((query.clone(), observer));
        Ok(ListenerRegistration::noop())
    }

    async fn add(&self, collection: &str, data: MapValue) -> StoreResult<DocumentKey> {
        self.backing.add(collection, data).await
    }

    async fn set(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()> {
        self.backing.set(key, data).await
    }

    async fn update(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()> {
        let index = self.updates.fetch_add(1, Ordering::SeqCst);
        let fail = {
            let mut fail_at = self.fail_update_at.lock().unwrap();
            if *fail_at == Some(index) {
                *fail_at = None;
                true
            } else {
                false
            }
        };
        if fail {
            return Err(unavailable("connection reset"));
        }
        self.backing.update(key, data).await
    }

    async fn delete(&self, key: &DocumentKey) -> StoreResult<()> {
        self.backing.delete(key).await
    }

    async fn batch_write(&self, writes: Vec<WriteOperation>) -> StoreResult<()> {
        self.backing.batch_write(writes).await
    }

    fn supports_atomic_batch(&self) -> bool {
        self.atomic
    }
}

pub fn key(collection: &str, id: &str) -> DocumentKey {
    DocumentKey::new(collection, id).unwrap()
}
