use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::platform::runtime::spawn_detached;
use crate::store::api::{decode_documents, DocumentModel, DocumentSnapshot, Query, QuerySnapshot};
use crate::store::datastore::RemoteStore;
use crate::store::error::{invalid_argument, StoreError, StoreResult};
use crate::store::value::{MapValue, Value};
use crate::sync::edit_buffer::{EditBuffer, MergedDocument};
use crate::sync::notify::{Notification, Notifier};
use crate::sync::schema::FieldSchema;
use crate::sync::settings::SyncSettings;
use crate::sync::subscription::SubscriptionManager;
use crate::sync::writer::{WriteCoordinator, WriteMode, WriteOutcome};

/// What a screen renders: remote documents merged with local edits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListView {
    pub documents: Vec<MergedDocument>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ListView {
    pub fn get(&self, document_id: &str) -> Option<&MergedDocument> {
        self.documents.iter().find(|doc| doc.id == document_id)
    }

    /// Decodes the merged documents into their typed model, skipping malformed ones.
    pub fn decode<M: DocumentModel>(&self) -> Vec<M> {
        decode_documents(
            self.documents
                .iter()
                .map(|doc| (doc.id.as_str(), &doc.fields)),
        )
        .0
    }
}

type RenderCallback = Arc<dyn Fn(&ListView) + Send + Sync + 'static>;

/// A screen's synchronized document list.
///
/// Wires a [`SubscriptionManager`], an [`EditBuffer`], and a [`WriteCoordinator`]
/// together for one collection. Edits are validated against the [`FieldSchema`],
/// shown immediately, and written according to each field's [`WriteMode`]. Store
/// errors become notifications; the list itself never panics.
pub struct SynchronizedList {
    inner: Arc<ListInner>,
    subscriptions: SubscriptionManager,
}

struct ListInner {
    store: Arc<dyn RemoteStore>,
    collection: String,
    schema: FieldSchema,
    writer: WriteCoordinator,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ListState>,
    on_render: Mutex<Option<RenderCallback>>,
}

#[derive(Default)]
struct ListState {
    buffer: EditBuffer,
    documents: Vec<DocumentSnapshot>,
    loading: bool,
    error: Option<String>,
    // False for one-shot loads, where no snapshot will echo our own writes.
    live: bool,
    closed: bool,
}

impl ListState {
    /// Applies an acknowledged write to the base documents of a one-shot load. Live
    /// lists get the same change from the next snapshot.
    fn patch_base(&mut self, document_id: &str, fields: &MapValue) {
        if self.live {
            return;
        }
        if let Some(base) = self.documents.iter_mut().find(|doc| doc.id() == document_id) {
            *base = base.patched(fields);
        }
    }
}

impl SynchronizedList {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        schema: FieldSchema,
        settings: SyncSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let collection = collection.into();
        let writer = WriteCoordinator::new(Arc::clone(&store), collection.clone(), settings);
        let subscriptions = SubscriptionManager::new(Arc::clone(&store));
        let inner = Arc::new(ListInner {
            store,
            collection,
            schema,
            writer,
            notifier,
            state: Mutex::new(ListState::default()),
            on_render: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner.writer.on_sent(move |pending| {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock_state()
                    .buffer
                    .mark_in_flight(&pending.document_id, &pending.fields);
            }
        });
        let weak = Arc::downgrade(&inner);
        inner.writer.on_outcome(move |outcome| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_outcome(outcome);
            }
        });
        let weak = Arc::downgrade(&inner);
        subscriptions.on_error(move |error| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_query_error(error);
            }
        });

        Self {
            inner,
            subscriptions,
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    pub fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Registers the callback invoked with a fresh view after every change.
    pub fn on_render<F>(&self, callback: F)
    where
        F: Fn(&ListView) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Starts the live query. The first view is rendered before this returns.
    pub async fn open(&self, query: Query) -> StoreResult<()> {
        self.ensure_collection(&query)?;
        {
            let mut state = self.inner.lock_state();
            state.loading = true;
            state.live = true;
        }
        let weak = Arc::downgrade(&self.inner);
        self.subscriptions
            .subscribe(query, move |snapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_snapshot(snapshot);
                }
            })
            .await?;
        Ok(())
    }

    /// Switches the live query, detaching the previous listener first.
    pub async fn change_query(&self, query: Query) -> StoreResult<()> {
        self.open(query).await
    }

    /// Loads `query` once for screens that do not need live updates.
    pub async fn load_once(&self, query: Query) -> StoreResult<()> {
        self.ensure_collection(&query)?;
        self.inner.lock_state().live = false;
        let weak: Weak<ListInner> = Arc::downgrade(&self.inner);
        self.subscriptions
            .fetch_once(query, move |snapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_snapshot(snapshot);
                }
            })
            .await?;
        Ok(())
    }

    /// Re-runs the last [`load_once`](Self::load_once).
    pub async fn refresh(&self) -> StoreResult<()> {
        self.subscriptions.refresh().await.map(|_| ())
    }

    pub fn view(&self) -> ListView {
        self.inner.view()
    }

    /// Buffers a local edit and schedules its write. Invalid input is rejected with a
    /// validation error and a notification; nothing is buffered in that case.
    pub fn edit(&self, document_id: &str, field: &str, value: impl Into<Value>) -> StoreResult<()> {
        let spec = self.inner.schema.spec(field);
        let normalized = self.inner.schema.normalize(field, value.into());
        let (value, mode) = match (normalized, spec) {
            (Ok(value), Some(spec)) => (value, spec.mode),
            (Err(err), _) => return Err(self.inner.report(err)),
            (Ok(_), None) => {
                return Err(self
                    .inner
                    .report(invalid_argument(format!("field `{field}` is not editable"))))
            }
        };
        self.inner.buffer_and_schedule(document_id, field, value, mode);
        Ok(())
    }

    /// Writes the document's coalesced edits now, e.g. when an input loses focus.
    pub async fn commit(&self, document_id: &str) {
        self.inner.writer.flush_now(document_id).await;
    }

    pub fn toggle(&self, document_id: &str, field: &str, checked: bool) -> StoreResult<()> {
        self.edit(document_id, field, Value::from_bool(checked))
    }

    /// Sets `field` to `value` on every document currently shown, all or nothing.
    ///
    /// On failure the edits the user had on the field before the reset come back; their
    /// queued writes were dropped, so unsent ones are flagged for retry.
    pub async fn reset_all(&self, field: &str, value: impl Into<Value>) -> StoreResult<()> {
        let value = self
            .inner
            .schema
            .normalize(field, value.into())
            .map_err(|err| self.inner.report(err))?;
        let patch = MapValue::empty().with(field, value.clone());
        let null = Value::null();
        let (ids, earlier) = {
            let mut state = self.inner.lock_state();
            let targets: Vec<(String, Value)> = state
                .documents
                .iter()
                .map(|doc| {
                    let stored = doc.get(field).unwrap_or(&null).clone();
                    (doc.id().to_string(), stored)
                })
                .collect();
            let mut earlier = Vec::new();
            for (id, stored) in &targets {
                if let Some(edit) = state.buffer.get(id, field) {
                    earlier.push(edit.clone());
                }
                state.buffer.apply_local_edit(id, field, value.clone());
                state.buffer.mark_in_flight(id, &patch);
                // A rollback writes the stored value back; its snapshot is our own.
                state.buffer.mark_sent(id, field, stored);
            }
            let ids: Vec<String> = targets.into_iter().map(|(id, _)| id).collect();
            (ids, earlier)
        };
        self.inner.render();

        let result = self.inner.writer.reset_all(&ids, field, value).await;
        {
            let mut state = self.inner.lock_state();
            for id in &ids {
                match &result {
                    Ok(()) => {
                        state.patch_base(id, &patch);
                        state.buffer.confirm(id, &patch);
                    }
                    Err(_) => {
                        state.buffer.clear_edit(id, field);
                    }
                }
            }
            if result.is_err() {
                for mut edit in earlier {
                    if edit.in_flight.is_none() {
                        edit.failed = true;
                    }
                    state.buffer.restore(edit);
                }
            }
        }
        match result {
            Ok(()) => {
                self.inner.render();
                Ok(())
            }
            Err(err) => {
                let err = self.inner.report(err);
                self.inner.render();
                Err(err)
            }
        }
    }

    /// Schedules the failed edits of the document again; returns how many.
    pub fn retry_failed(&self, document_id: &str) -> usize {
        let failed: Vec<(String, Value)> = {
            let state = self.inner.lock_state();
            state
                .buffer
                .failed_edits()
                .into_iter()
                .filter(|edit| edit.document_id == document_id)
                .map(|edit| (edit.field.clone(), edit.value.clone()))
                .collect()
        };
        for (field, value) in &failed {
            self.inner
                .buffer_and_schedule(document_id, field, value.clone(), WriteMode::Immediate);
        }
        failed.len()
    }

    /// Drops the local edit and its pending write; the view falls back to the store.
    pub fn cancel_edit(&self, document_id: &str, field: &str) {
        self.inner.lock_state().buffer.clear_edit(document_id, field);
        self.inner.writer.discard(document_id, field);
        self.inner.render();
    }

    pub fn has_pending_writes(&self) -> bool {
        self.inner.writer.has_pending()
    }

    /// Writes every pending edit now and waits for the writes to finish.
    pub async fn flush_all(&self) {
        self.inner.writer.flush_all().await;
    }

    /// Writes every pending edit, then detaches the listener and stops recurring tasks.
    pub async fn close(&self) {
        self.inner.lock_state().closed = true;
        self.inner.writer.flush_all().await;
        self.subscriptions.teardown();
    }

    fn ensure_collection(&self, query: &Query) -> StoreResult<()> {
        if query.collection() != self.inner.collection {
            return Err(invalid_argument(format!(
                "query targets `{}` but the list shows `{}`",
                query.collection(),
                self.inner.collection
            )));
        }
        Ok(())
    }
}

impl Drop for SynchronizedList {
    fn drop(&mut self) {
        let closed = self.inner.lock_state().closed;
        if !closed && self.inner.writer.has_pending() {
            let writer = self.inner.writer.clone();
            spawn_detached(async move {
                writer.flush_all().await;
            });
        }
    }
}

impl ListInner {
    fn lock_state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> ListView {
        let state = self.lock_state();
        ListView {
            documents: state.buffer.reconcile(&state.documents),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    fn render(&self) {
        let callback = self
            .on_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            let view = self.view();
            callback(&view);
        }
    }

    fn report(&self, error: StoreError) -> StoreError {
        log::warn!("{}: {error}", self.collection);
        self.notifier.notify(Notification::error(error.message()));
        error
    }

    fn buffer_and_schedule(&self, document_id: &str, field: &str, value: Value, mode: WriteMode) {
        self.lock_state()
            .buffer
            .apply_local_edit(document_id, field, value.clone());
        self.render();
        self.writer.schedule_write(document_id, field, value, mode);
    }

    fn handle_snapshot(&self, snapshot: &QuerySnapshot) {
        let superseded = {
            let mut state = self.lock_state();
            let superseded = state.buffer.observe_snapshot(snapshot.documents());
            state.documents = snapshot.documents().to_vec();
            state.loading = false;
            state.error = None;
            superseded
        };
        for lost in &superseded {
            self.writer.discard(&lost.document_id, &lost.field);
            self.notifier.notify(Notification::info(format!(
                "{} was changed elsewhere; showing the latest value",
                lost.field
            )));
        }
        self.render();
    }

    fn handle_query_error(&self, error: &StoreError) {
        {
            let mut state = self.lock_state();
            state.error = Some(error.to_string());
            state.loading = false;
        }
        self.notifier.notify(Notification::error(format!(
            "Could not load {}: {}",
            self.collection,
            error.message()
        )));
        self.render();
    }

    fn handle_outcome(&self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Confirmed {
                document_id,
                fields,
            } => {
                let mut state = self.lock_state();
                state.patch_base(document_id, fields);
                state.buffer.confirm(document_id, fields);
            }
            WriteOutcome::Failed {
                document_id, error, ..
            } if error.is_not_found() => {
                log::debug!("{}/{document_id} no longer exists; dropping its edits", self.collection);
                self.lock_state().buffer.clear_document(document_id);
            }
            WriteOutcome::Failed {
                document_id,
                fields,
                error,
            } => {
                self.lock_state().buffer.mark_failed(document_id, fields);
                self.notifier.notify(Notification::error(format!(
                    "Could not save changes: {}",
                    error.message()
                )));
            }
        }
        self.render();
    }
}
