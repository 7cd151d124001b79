use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::store::api::{DocumentSnapshot, Query, QuerySnapshot};
use crate::store::error::{not_found, unavailable, StoreError, StoreResult};
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::query_evaluator::apply_query_to_documents;
use crate::store::value::MapValue;
use crate::util::{ListenerRegistration, PartialObserver};

use super::{RemoteStore, WriteOperation};

/// Process-local document store with live query listeners.
///
/// Writes are applied immediately and every listener whose result set changed receives a
/// fresh snapshot. Each document carries a version bumped on every write and a strictly
/// increasing server update time. The network can be toggled off to exercise transport
/// failures, and individual writes can be made to fail with queued errors.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    state: Mutex<StoreState>,
    next_listener_id: AtomicU64,
}

#[derive(Default)]
struct StoreState {
    documents: BTreeMap<DocumentKey, StoredDocument>,
    version: u64,
    last_update_time: Option<Timestamp>,
    listeners: Vec<ListenerEntry>,
    offline: bool,
    injected_failures: VecDeque<StoreError>,
    committed: Vec<WriteOperation>,
}

#[derive(Clone)]
struct StoredDocument {
    fields: MapValue,
    version: u64,
    update_time: Timestamp,
}

#[derive(Clone)]
struct ListenerEntry {
    id: u64,
    query: Query,
    observer: PartialObserver<QuerySnapshot>,
    sequence: u64,
    last_documents: Vec<(String, u64)>,
}

type Delivery = (PartialObserver<QuerySnapshot>, QuerySnapshot);

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `store/unavailable` and reports the outage
    /// to live listeners.
    pub fn disable_network(&self) {
        let observers: Vec<PartialObserver<QuerySnapshot>> = {
            let mut state = self.lock_state();
            state.offline = true;
            state
                .listeners
                .iter()
                .map(|entry| entry.observer.clone())
                .collect()
        };
        let error = unavailable("The store is offline");
        for observer in observers {
            observer.notify_error(&error);
        }
    }

    /// Restores connectivity and re-delivers the current result set to every listener.
    pub fn enable_network(&self) {
        let deliveries = {
            let mut state = self.lock_state();
            state.offline = false;
            state.collect_deliveries(true)
        };
        dispatch(deliveries);
    }

    /// Queues an error returned by the next write call instead of applying it.
    pub fn fail_next_write(&self, error: StoreError) {
        self.lock_state().injected_failures.push_back(error);
    }

    /// Every write applied so far, in commit order.
    pub fn committed_writes(&self) -> Vec<WriteOperation> {
        self.lock_state().committed.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock_state().listeners.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, writes: Vec<WriteOperation>) -> StoreResult<()> {
        let deliveries = {
            let mut state = self.lock_state();
            state.ensure_online()?;
            if let Some(error) = state.injected_failures.pop_front() {
                return Err(error);
            }

            let update_time = state.next_update_time();
            let mut staged = state.documents.clone();
            let mut version = state.version;
            for write in &writes {
                version += 1;
                apply_write(&mut staged, write, version, update_time)?;
            }

            state.documents = staged;
            state.version = version;
            state.last_update_time = Some(update_time);
            state.committed.extend(writes);
            state.collect_deliveries(false)
        };
        dispatch(deliveries);
        Ok(())
    }

    fn remove_listener(inner: &StoreInner, id: u64) {
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.listeners.retain(|entry| entry.id != id);
    }
}

impl StoreState {
    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline {
            Err(unavailable("The store is offline"))
        } else {
            Ok(())
        }
    }

    fn next_update_time(&self) -> Timestamp {
        let now = Timestamp::now();
        match self.last_update_time {
            Some(last) if now <= last => last.successor(),
            _ => now,
        }
    }

    fn snapshots(&self) -> Vec<DocumentSnapshot> {
        self.documents
            .iter()
            .map(|(key, stored)| {
                DocumentSnapshot::new(
                    key.clone(),
                    stored.fields.clone(),
                    stored.version,
                    stored.update_time,
                )
            })
            .collect()
    }

    fn run_query(&self, query: &Query) -> Vec<DocumentSnapshot> {
        apply_query_to_documents(self.snapshots(), query)
    }

    // Listeners hear about a write only when their result set actually moved.
    fn collect_deliveries(&mut self, force: bool) -> Vec<Delivery> {
        let all = self.snapshots();
        let mut deliveries = Vec::new();
        for entry in &mut self.listeners {
            let documents = apply_query_to_documents(all.clone(), &entry.query);
            let fingerprint = fingerprint(&documents);
            if !force && fingerprint == entry.last_documents {
                continue;
            }
            entry.sequence += 1;
            entry.last_documents = fingerprint;
            deliveries.push((
                entry.observer.clone(),
                QuerySnapshot::new(entry.query.clone(), documents, entry.sequence),
            ));
        }
        deliveries
    }
}

fn fingerprint(documents: &[DocumentSnapshot]) -> Vec<(String, u64)> {
    documents
        .iter()
        .map(|doc| (doc.id().to_string(), doc.version()))
        .collect()
}

fn dispatch(deliveries: Vec<Delivery>) {
    for (observer, snapshot) in deliveries {
        observer.notify_next(&snapshot);
    }
}

fn apply_write(
    documents: &mut BTreeMap<DocumentKey, StoredDocument>,
    write: &WriteOperation,
    version: u64,
    update_time: Timestamp,
) -> StoreResult<()> {
    match write {
        WriteOperation::Set { key, data } => {
            documents.insert(
                key.clone(),
                StoredDocument {
                    fields: data.clone(),
                    version,
                    update_time,
                },
            );
        }
        WriteOperation::Update { key, data } => {
            let stored = documents
                .get_mut(key)
                .ok_or_else(|| not_found(format!("Document {key} does not exist")))?;
            stored.fields.merge(data);
            stored.version = version;
            stored.update_time = update_time;
        }
        WriteOperation::Delete { key } => {
            documents.remove(key);
        }
    }
    Ok(())
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for InMemoryStore {
    async fn get(&self, key: &DocumentKey) -> StoreResult<DocumentSnapshot> {
        let state = self.lock_state();
        state.ensure_online()?;
        Ok(match state.documents.get(key) {
            Some(stored) => DocumentSnapshot::new(
                key.clone(),
                stored.fields.clone(),
                stored.version,
                stored.update_time,
            ),
            None => DocumentSnapshot::missing(key.clone()),
        })
    }

    async fn list(&self, query: &Query) -> StoreResult<QuerySnapshot> {
        let state = self.lock_state();
        state.ensure_online()?;
        Ok(QuerySnapshot::new(query.clone(), state.run_query(query), 0))
    }

    async fn subscribe(
        &self,
        query: &Query,
        observer: PartialObserver<QuerySnapshot>,
    ) -> StoreResult<ListenerRegistration> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let initial = {
            let mut state = self.lock_state();
            state.ensure_online()?;
            let documents = state.run_query(query);
            state.listeners.push(ListenerEntry {
                id,
                query: query.clone(),
                observer: observer.clone(),
                sequence: 1,
                last_documents: fingerprint(&documents),
            });
            QuerySnapshot::new(query.clone(), documents, 1)
        };
        observer.notify_next(&initial);

        let inner = Arc::clone(&self.inner);
        Ok(ListenerRegistration::new(Box::new(move || {
            InMemoryStore::remove_listener(&inner, id);
        })))
    }

    async fn add(&self, collection: &str, data: MapValue) -> StoreResult<DocumentKey> {
        let key = DocumentKey::generate(collection)?;
        self.commit(vec![WriteOperation::Set {
            key: key.clone(),
            data,
        }])?;
        Ok(key)
    }

    async fn set(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()> {
        self.commit(vec![WriteOperation::Set {
            key: key.clone(),
            data,
        }])
    }

    async fn update(&self, key: &DocumentKey, data: MapValue) -> StoreResult<()> {
        self.commit(vec![WriteOperation::Update {
            key: key.clone(),
            data,
        }])
    }

    async fn delete(&self, key: &DocumentKey) -> StoreResult<()> {
        self.commit(vec![WriteOperation::Delete { key: key.clone() }])
    }

    async fn batch_write(&self, writes: Vec<WriteOperation>) -> StoreResult<()> {
        self.commit(writes)
    }
}
