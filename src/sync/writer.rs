use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::platform::runtime::{sleep, spawn_after};
use crate::store::api::WriteBatch;
use crate::store::datastore::RemoteStore;
use crate::store::error::{StoreError, StoreResult};
use crate::store::model::DocumentKey;
use crate::store::value::{MapValue, Value};
use crate::sync::settings::SyncSettings;

/// How an edit reaches the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Coalesced with later edits to the same field and written after the debounce
    /// window, the max wait, or an explicit flush.
    Debounced,
    /// Written at once, e.g. checkbox toggles.
    Immediate,
}

/// Field values sealed for one update of one document.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingWrite {
    pub document_id: String,
    pub fields: MapValue,
    pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    Confirmed {
        document_id: String,
        fields: MapValue,
    },
    Failed {
        document_id: String,
        fields: MapValue,
        error: StoreError,
    },
}

impl WriteOutcome {
    pub fn document_id(&self) -> &str {
        match self {
            WriteOutcome::Confirmed { document_id, .. }
            | WriteOutcome::Failed { document_id, .. } => document_id,
        }
    }
}

type OutcomeCallback = Arc<dyn Fn(&WriteOutcome) + Send + Sync + 'static>;
type SentCallback = Arc<dyn Fn(&PendingWrite) + Send + Sync + 'static>;

/// Coalesces, orders, and issues the writes of one collection.
///
/// Each document has its own queue: values scheduled within a window are merged into
/// one update, sealed writes wait in FIFO order, and a per-document async lock
/// guarantees a single drainer so same-document writes reach the store in the order
/// they were scheduled. A queue is dropped once it is idle and nobody is draining it.
#[derive(Clone)]
pub struct WriteCoordinator {
    inner: Arc<WriterInner>,
}

struct WriterInner {
    store: Arc<dyn RemoteStore>,
    collection: String,
    settings: SyncSettings,
    documents: Mutex<BTreeMap<String, DocumentQueue>>,
    // Source of generations and windows; shared so a pruned and recreated queue
    // never reuses a number an old timer still holds.
    ticks: AtomicU64,
    on_outcome: Mutex<Option<OutcomeCallback>>,
    on_sent: Mutex<Option<SentCallback>>,
}

#[derive(Default)]
struct DocumentQueue {
    scheduled: BTreeMap<String, Value>,
    // Renewed on every schedule and seal; a debounce timer only fires for the
    // generation it was started with.
    generation: u64,
    window: u64,
    window_open: bool,
    ready: VecDeque<PendingWrite>,
    drain_lock: Arc<async_lock::Mutex<()>>,
}

impl DocumentQueue {
    fn seal(&mut self, document_id: &str, tick: u64) {
        self.generation = tick;
        self.window_open = false;
        if self.scheduled.is_empty() {
            return;
        }
        let fields: MapValue = std::mem::take(&mut self.scheduled).into_iter().collect();
        self.ready.push_back(PendingWrite {
            document_id: document_id.to_string(),
            fields,
            attempts: 0,
        });
    }

    fn is_idle(&self) -> bool {
        self.scheduled.is_empty() && self.ready.is_empty()
    }

    fn can_prune(&self) -> bool {
        self.is_idle() && !self.window_open && Arc::strong_count(&self.drain_lock) == 1
    }
}

impl WriteCoordinator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                store,
                collection: collection.into(),
                settings,
                documents: Mutex::new(BTreeMap::new()),
                ticks: AtomicU64::new(0),
                on_outcome: Mutex::new(None),
                on_sent: Mutex::new(None),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    /// Registers the callback receiving every write outcome. Replaces any earlier one.
    pub fn on_outcome<F>(&self, callback: F)
    where
        F: Fn(&WriteOutcome) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Registers the callback invoked with each sealed write right before it is
    /// issued to the store. Replaces any earlier one.
    pub fn on_sent<F>(&self, callback: F)
    where
        F: Fn(&PendingWrite) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn schedule_write(&self, document_id: &str, field: &str, value: Value, mode: WriteMode) {
        let (generation, new_window) = {
            let mut documents = self.inner.lock_documents();
            let queue = documents.entry(document_id.to_string()).or_default();
            queue.scheduled.insert(field.to_string(), value);
            queue.generation = self.inner.next_tick();
            let new_window = if queue.window_open {
                None
            } else {
                queue.window_open = true;
                queue.window = self.inner.next_tick();
                Some(queue.window)
            };
            if mode == WriteMode::Immediate {
                queue.seal(document_id, self.inner.next_tick());
            }
            (queue.generation, new_window)
        };

        if mode == WriteMode::Immediate {
            let inner = Arc::clone(&self.inner);
            let document_id = document_id.to_string();
            spawn_after(std::time::Duration::ZERO, None, move || async move {
                inner.drain(&document_id).await;
            });
            return;
        }

        let inner = Arc::clone(&self.inner);
        let id = document_id.to_string();
        spawn_after(self.inner.settings.debounce(), None, move || async move {
            inner.seal_if(&id, |queue| queue.generation == generation).await;
        });

        if let (Some(window), Some(max_wait)) = (new_window, self.inner.settings.max_wait()) {
            let inner = Arc::clone(&self.inner);
            let id = document_id.to_string();
            spawn_after(max_wait, None, move || async move {
                inner
                    .seal_if(&id, |queue| queue.window_open && queue.window == window)
                    .await;
            });
        }
    }

    /// Writes any coalesced values for the document now and waits until every write
    /// sealed for it so far has completed.
    pub async fn flush_now(&self, document_id: &str) {
        {
            let mut documents = self.inner.lock_documents();
            if let Some(queue) = documents.get_mut(document_id) {
                queue.seal(document_id, self.inner.next_tick());
            }
        }
        self.inner.drain(document_id).await;
    }

    pub async fn flush_all(&self) {
        let ids: Vec<String> = {
            let documents = self.inner.lock_documents();
            documents
                .iter()
                .filter(|(_, queue)| !queue.is_idle())
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            self.flush_now(&id).await;
        }
    }

    /// Drops the not-yet-issued value for `(document_id, field)`. Writes already
    /// handed to the store are not aborted.
    pub fn discard(&self, document_id: &str, field: &str) {
        let mut documents = self.inner.lock_documents();
        let Some(queue) = documents.get_mut(document_id) else {
            return;
        };
        queue.scheduled.remove(field);
        if queue.scheduled.is_empty() {
            queue.window_open = false;
        }
        for pending in queue.ready.iter_mut() {
            let mut fields = std::mem::take(&mut pending.fields).into_fields();
            fields.remove(field);
            pending.fields = MapValue::new(fields);
        }
        queue.ready.retain(|pending| !pending.fields.is_empty());
        if queue.can_prune() {
            documents.remove(document_id);
        }
        log::debug!("discarded pending write of {document_id}.{field}");
    }

    /// Sets `field` to `value` on every listed document, all or nothing.
    ///
    /// Pending coalesced values for the field are discarded first. Stores with atomic
    /// batches get one batch; otherwise prior values are recorded, updates are applied
    /// in order, and a failure restores the already updated documents before the error
    /// is returned.
    pub async fn reset_all(&self, document_ids: &[String], field: &str, value: Value) -> StoreResult<()> {
        if document_ids.is_empty() {
            return Ok(());
        }
        for id in document_ids {
            self.discard(id, field);
        }

        let keys = document_ids
            .iter()
            .map(|id| DocumentKey::new(self.inner.collection.as_str(), id.as_str()))
            .collect::<StoreResult<Vec<_>>>()?;
        let patch = MapValue::empty().with(field, value);

        if self.inner.store.supports_atomic_batch() {
            let mut batch = WriteBatch::new(Arc::clone(&self.inner.store));
            for key in keys {
                batch.update(key, patch.clone())?;
            }
            return batch.commit().await;
        }

        let mut applied: Vec<(DocumentKey, Value)> = Vec::with_capacity(keys.len());
        for key in keys {
            let result = async {
                let prior = self.inner.store.get(&key).await?;
                let prior = prior.get(field).cloned().unwrap_or_else(Value::null);
                self.inner.store.update(&key, patch.clone()).await?;
                Ok::<_, StoreError>(prior)
            }
            .await;

            match result {
                Ok(prior) => applied.push((key, prior)),
                Err(err) => {
                    log::warn!(
                        "reset of {field} failed at {key}: {err}; restoring {} documents",
                        applied.len()
                    );
                    self.compensate(field, applied).await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Documents with values scheduled or sealed but not yet written.
    pub fn pending_documents(&self) -> Vec<String> {
        let documents = self.inner.lock_documents();
        documents
            .iter()
            .filter(|(_, queue)| !queue.is_idle())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_documents().is_empty()
    }

    async fn compensate(&self, field: &str, applied: Vec<(DocumentKey, Value)>) {
        for (key, prior) in applied.into_iter().rev() {
            let restore = MapValue::empty().with(field, prior);
            if let Err(err) = self.inner.store.update(&key, restore).await {
                log::error!("failed to restore {field} on {key}: {err}");
            }
        }
    }
}

impl WriterInner {
    fn lock_documents(&self) -> MutexGuard<'_, BTreeMap<String, DocumentQueue>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn prune(&self, document_id: &str) {
        let mut documents = self.lock_documents();
        if documents.get(document_id).is_some_and(DocumentQueue::can_prune) {
            documents.remove(document_id);
        }
    }

    async fn seal_if(&self, document_id: &str, should_seal: impl FnOnce(&DocumentQueue) -> bool) {
        let sealed = {
            let mut documents = self.lock_documents();
            match documents.get_mut(document_id) {
                Some(queue) if !queue.scheduled.is_empty() && should_seal(queue) => {
                    queue.seal(document_id, self.next_tick());
                    true
                }
                _ => false,
            }
        };
        if sealed {
            log::debug!("flushing coalesced edits for {}/{document_id}", self.collection);
            self.drain(document_id).await;
        }
    }

    async fn drain(&self, document_id: &str) {
        let drain_lock = {
            let mut documents = self.lock_documents();
            let queue = documents.entry(document_id.to_string()).or_default();
            Arc::clone(&queue.drain_lock)
        };
        {
            let _guard = drain_lock.lock().await;
            loop {
                let next = {
                    let mut documents = self.lock_documents();
                    documents
                        .get_mut(document_id)
                        .and_then(|queue| queue.ready.pop_front())
                };
                let Some(pending) = next else {
                    break;
                };
                self.emit_sent(&pending);
                let outcome = self.write(pending).await;
                self.emit(&outcome);
            }
        }
        drop(drain_lock);
        self.prune(document_id);
    }

    async fn write(&self, mut pending: PendingWrite) -> WriteOutcome {
        let key = match DocumentKey::new(self.collection.as_str(), pending.document_id.as_str()) {
            Ok(key) => key,
            Err(error) => {
                return WriteOutcome::Failed {
                    document_id: pending.document_id,
                    fields: pending.fields,
                    error,
                }
            }
        };

        loop {
            let attempt = pending.attempts;
            pending.attempts += 1;
            match self.store.update(&key, pending.fields.clone()).await {
                Ok(()) => {
                    return WriteOutcome::Confirmed {
                        document_id: pending.document_id,
                        fields: pending.fields,
                    }
                }
                Err(error) if self.settings.retry().should_retry(attempt, &error) => {
                    let delay = self.settings.retry().backoff_delay(attempt);
                    log::debug!("retrying write of {key} in {delay:?}: {error}");
                    sleep(delay).await;
                }
                Err(error) => {
                    log::warn!(
                        "write of {key} failed after {} attempt(s): {error}",
                        pending.attempts
                    );
                    return WriteOutcome::Failed {
                        document_id: pending.document_id,
                        fields: pending.fields,
                        error,
                    };
                }
            }
        }
    }

    fn emit_sent(&self, pending: &PendingWrite) {
        let callback = self
            .on_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(pending);
        }
    }

    fn emit(&self, outcome: &WriteOutcome) {
        let callback = self
            .on_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::platform::runtime::sleep;
    use crate::store::datastore::{InMemoryStore, WriteOperation};
    use crate::store::error::unavailable;
    use crate::sync::settings::RetrySettings;
    use std::time::Duration;

    async fn seeded_store(ids: &[&str]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for id in ids {
            let key = DocumentKey::new("inventory", *id).unwrap();
            store
                .set(&key, MapValue::empty().with("current", 0i64).with("notes", ""))
                .await
                .unwrap();
        }
        store
    }

    fn updates(store: &InMemoryStore) -> Vec<WriteOperation> {
        store
            .committed_writes()
            .into_iter()
            .filter(|write| matches!(write, WriteOperation::Update { .. }))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_edits_coalesce_into_one_update() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        for value in 1..=5i64 {
            writer.schedule_write("flour", "current", Value::from_integer(value), WriteMode::Debounced);
            sleep(Duration::from_millis(100)).await;
        }
        assert!(updates(&store).is_empty());

        sleep(Duration::from_millis(600)).await;
        let writes = updates(&store);
        assert_eq!(writes.len(), 1);
        let key = DocumentKey::new("inventory", "flour").unwrap();
        assert_eq!(
            store.get(&key).await.unwrap().get("current"),
            Some(&Value::from_integer(5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_bounds_continuous_typing() {
        let store = seeded_store(&["flour"]).await;
        let settings = SyncSettings::new(500, Some(1_000), RetrySettings::default()).unwrap();
        let writer = WriteCoordinator::new(store.clone(), "inventory", settings);

        for value in 0..8i64 {
            writer.schedule_write("flour", "notes", Value::from_string(format!("n{value}")), WriteMode::Debounced);
            sleep(Duration::from_millis(200)).await;
        }
        assert!(!updates(&store).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fields_of_one_window_share_an_update() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        writer.schedule_write("flour", "current", Value::from_integer(3), WriteMode::Debounced);
        writer.schedule_write("flour", "notes", Value::from_string("order more"), WriteMode::Debounced);
        writer.flush_now("flour").await;

        let writes = updates(&store);
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            WriteOperation::Update { data, .. } => assert_eq!(data.len(), 2),
            other => panic!("unexpected write {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_writes_keep_schedule_order() {
        let store = seeded_store(&["lights"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        writer.schedule_write("lights", "current", Value::from_integer(1), WriteMode::Immediate);
        writer.schedule_write("lights", "current", Value::from_integer(2), WriteMode::Immediate);
        writer.schedule_write("lights", "current", Value::from_integer(3), WriteMode::Immediate);
        writer.flush_now("lights").await;

        let values: Vec<i64> = updates(&store)
            .into_iter()
            .filter_map(|write| match write {
                WriteOperation::Update { data, .. } => data.get("current").and_then(Value::as_integer),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_cancels_pending_value() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        writer.schedule_write("flour", "current", Value::from_integer(8), WriteMode::Debounced);
        writer.discard("flour", "current");
        sleep(Duration::from_secs(10)).await;

        assert!(updates(&store).is_empty());
        assert!(!writer.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_and_transport_errors_retried() {
        let store = seeded_store(&["flour"]).await;
        let settings = SyncSettings::new(
            500,
            Some(5_000),
            RetrySettings {
                max_attempts: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let writer = WriteCoordinator::new(store.clone(), "inventory", settings);
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        writer.on_outcome(move |outcome| sink.lock().unwrap().push(outcome.clone()));

        store.fail_next_write(unavailable("flaky"));
        writer.schedule_write("flour", "current", Value::from_integer(4), WriteMode::Immediate);
        writer.flush_now("flour").await;
        sleep(Duration::from_secs(1)).await;

        store.fail_next_write(unavailable("down"));
        store.fail_next_write(unavailable("still down"));
        writer.schedule_write("flour", "current", Value::from_integer(5), WriteMode::Immediate);
        writer.flush_now("flour").await;
        sleep(Duration::from_secs(1)).await;

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], WriteOutcome::Confirmed { .. }));
        match &outcomes[1] {
            WriteOutcome::Failed { error, .. } => assert!(error.is_transport()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());
        let key = DocumentKey::new("inventory", "flour").unwrap();

        writer.schedule_write("flour", "current", Value::from_integer(6), WriteMode::Immediate);
        writer.flush_now("flour").await;
        let once = store.get(&key).await.unwrap().data().cloned();

        writer.schedule_write("flour", "current", Value::from_integer(6), WriteMode::Immediate);
        writer.flush_now("flour").await;
        let twice = store.get(&key).await.unwrap().data().cloned();

        assert_eq!(once, twice);
    }

    #[tokio::test(start_paused = true)]
    async fn sent_callback_fires_when_the_write_is_issued() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        writer.on_sent(move |pending| sink.lock().unwrap().push(pending.fields.clone()));

        writer.schedule_write("flour", "current", Value::from_integer(4), WriteMode::Debounced);
        writer.schedule_write("flour", "current", Value::from_integer(45), WriteMode::Debounced);
        sleep(Duration::from_millis(100)).await;
        assert!(sent.lock().unwrap().is_empty());

        sleep(Duration::from_secs(1)).await;
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("current"), Some(&Value::from_integer(45)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queues_are_dropped() {
        let store = seeded_store(&["flour", "sugar"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        writer.schedule_write("flour", "current", Value::from_integer(1), WriteMode::Debounced);
        writer.schedule_write("sugar", "notes", Value::from_string("reorder"), WriteMode::Immediate);
        writer.schedule_write("sugar", "current", Value::from_integer(2), WriteMode::Debounced);
        writer.discard("sugar", "current");
        writer.flush_all().await;
        assert!(writer.inner.lock_documents().is_empty());

        writer.schedule_write("flour", "current", Value::from_integer(3), WriteMode::Debounced);
        writer.discard("flour", "current");
        assert!(writer.inner.lock_documents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timers_of_a_dropped_queue_do_not_seal_the_next_window() {
        let store = seeded_store(&["flour"]).await;
        let writer = WriteCoordinator::new(store.clone(), "inventory", SyncSettings::default());

        writer.schedule_write("flour", "current", Value::from_integer(1), WriteMode::Debounced);
        writer.flush_now("flour").await;
        assert_eq!(updates(&store).len(), 1);

        sleep(Duration::from_millis(300)).await;
        writer.schedule_write("flour", "current", Value::from_integer(2), WriteMode::Debounced);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(updates(&store).len(), 1);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(updates(&store).len(), 2);
    }
}
