use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;

use crate::platform::runtime::{spawn_interval, CancellationFlag};
use crate::store::api::{Query, QuerySnapshot};
use crate::store::datastore::RemoteStore;
use crate::store::error::{unavailable, StoreError, StoreResult};
use crate::util::{ListenerRegistration, PartialObserver};

pub type SnapshotCallback = Arc<dyn Fn(&QuerySnapshot) + Send + Sync + 'static>;
pub type ErrorCallback = Arc<dyn Fn(&StoreError) + Send + Sync + 'static>;

/// Identifies one live subscription of a manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    generation: u64,
    query_id: String,
}

impl SubscriptionHandle {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }
}

/// Owns the single live query of one screen.
///
/// Every accepted snapshot replaces the cached result wholesale. Deliveries from a
/// listener that was already replaced, and deliveries whose sequence does not advance
/// past the last accepted one, are dropped. Transport errors are recorded and
/// reported while the last good snapshot stays cached.
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    store: Arc<dyn RemoteStore>,
    state: Mutex<ManagerState>,
    on_error: Mutex<Option<ErrorCallback>>,
    recurring: Mutex<Vec<CancellationFlag>>,
}

#[derive(Default)]
struct ManagerState {
    generation: u64,
    active: Option<ActiveSubscription>,
    last_sequence: u64,
    last_snapshot: Option<QuerySnapshot>,
    last_error: Option<StoreError>,
    loading: bool,
    fetch: Option<(Query, SnapshotCallback)>,
}

struct ActiveSubscription {
    query: Query,
    handle: SubscriptionHandle,
    // Empty while the store call that attaches the listener is still running.
    registration: Option<ListenerRegistration>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                state: Mutex::new(ManagerState::default()),
                on_error: Mutex::new(None),
                recurring: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers the callback receiving transport errors of every subscription and
    /// fetch of this manager.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&StoreError) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Starts listening to `query`, replacing any other active subscription.
    ///
    /// The initial result is delivered to `on_snapshot` before this returns.
    /// Subscribing again with the same query is a no-op returning the current handle.
    pub async fn subscribe<F>(&self, query: Query, on_snapshot: F) -> StoreResult<SubscriptionHandle>
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        self.subscribe_with(query, Arc::new(on_snapshot), None).await
    }

    /// Stream form of [`subscribe`](Self::subscribe). The stream yields every
    /// accepted snapshot and every transport error, and ends once the subscription is
    /// replaced or torn down.
    pub async fn snapshots(&self, query: Query) -> StoreResult<SnapshotStream> {
        let (sender, receiver) = async_channel::unbounded();
        let snapshot_sender = sender.clone();
        let on_snapshot: SnapshotCallback = Arc::new(move |snapshot: &QuerySnapshot| {
            let _ = snapshot_sender.try_send(Ok(snapshot.clone()));
        });
        let on_error: ErrorCallback = Arc::new(move |error: &StoreError| {
            let _ = sender.try_send(Err(error.clone()));
        });
        self.subscribe_with(query, on_snapshot, Some(on_error)).await?;
        Ok(SnapshotStream {
            receiver: Box::pin(receiver),
        })
    }

    async fn subscribe_with(
        &self,
        query: Query,
        on_snapshot: SnapshotCallback,
        listener_error: Option<ErrorCallback>,
    ) -> StoreResult<SubscriptionHandle> {
        let query_id = query.canonical_id();
        let (handle, previous) = {
            let mut state = self.inner.lock_state();
            if let Some(active) = &state.active {
                if active.handle.query_id == query_id {
                    return Ok(active.handle.clone());
                }
            }
            state.generation += 1;
            let handle = SubscriptionHandle {
                generation: state.generation,
                query_id,
            };
            let previous = state.active.replace(ActiveSubscription {
                query: query.clone(),
                handle: handle.clone(),
                registration: None,
            });
            state.last_sequence = 0;
            state.loading = true;
            state.last_error = None;
            (handle, previous)
        };
        if let Some(previous) = previous.and_then(|active| active.registration) {
            log::debug!("detaching listener before query change");
            previous.detach();
        }

        let generation = handle.generation;
        let weak = Arc::downgrade(&self.inner);
        let error_weak = Weak::clone(&weak);
        let observer = PartialObserver::new()
            .with_next(move |snapshot: &QuerySnapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.accept_snapshot(generation, snapshot, &on_snapshot);
                }
            })
            .with_error(move |error: &(dyn Error + 'static)| {
                if let Some(inner) = error_weak.upgrade() {
                    let error = to_store_error(error);
                    if inner.record_error(Some(generation), &error) {
                        if let Some(callback) = &listener_error {
                            callback(&error);
                        }
                    }
                }
            });

        match self.inner.store.subscribe(&query, observer).await {
            Ok(registration) => {
                let orphan = {
                    let mut state = self.inner.lock_state();
                    match state.active.as_mut() {
                        Some(active) if active.handle.generation == generation => {
                            active.registration = Some(registration);
                            None
                        }
                        _ => Some(registration),
                    }
                };
                if let Some(orphan) = orphan {
                    orphan.detach();
                }
                log::debug!("listening to {}", handle.query_id);
                Ok(handle)
            }
            Err(err) => {
                {
                    let mut state = self.inner.lock_state();
                    if state.generation == generation {
                        state.active = None;
                    }
                }
                self.inner.record_error(Some(generation), &err);
                Err(err)
            }
        }
    }

    /// Detaches the active listener. Safe to call repeatedly.
    pub fn unsubscribe(&self) {
        let previous = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.loading = false;
            state.active.take()
        };
        if let Some(registration) = previous.and_then(|active| active.registration) {
            registration.detach();
            log::debug!("listener detached");
        }
    }

    /// Lists `query` once without listening for changes. The result is cached like a
    /// pushed snapshot and remembered for [`refresh`](Self::refresh).
    pub async fn fetch_once<F>(&self, query: Query, on_snapshot: F) -> StoreResult<QuerySnapshot>
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        let callback: SnapshotCallback = Arc::new(on_snapshot);
        {
            let mut state = self.inner.lock_state();
            state.fetch = Some((query.clone(), Arc::clone(&callback)));
        }
        self.inner.fetch(query, callback).await
    }

    /// Repeats the last [`fetch_once`](Self::fetch_once). Returns `None` when nothing
    /// was fetched yet.
    pub async fn refresh(&self) -> StoreResult<Option<QuerySnapshot>> {
        self.inner.refresh().await
    }

    /// Runs `task` every `interval` until [`teardown`](Self::teardown).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn schedule_recurring<F, Fut>(&self, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let flag = self.inner.register_recurring();
        spawn_interval(interval, flag, task);
    }

    /// Runs `task` every `interval` until [`teardown`](Self::teardown).
    #[cfg(target_arch = "wasm32")]
    pub fn schedule_recurring<F, Fut>(&self, interval: Duration, task: F)
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let flag = self.inner.register_recurring();
        spawn_interval(interval, flag, task);
    }

    /// Re-runs the last fetch every `interval` until teardown.
    pub fn refresh_every(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        self.schedule_recurring(interval, move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.refresh().await;
                }
            }
        });
    }

    /// Detaches the listener and cancels recurring tasks. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.unsubscribe();
        let flags: Vec<CancellationFlag> = self
            .inner
            .recurring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for flag in flags {
            flag.cancel();
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().loading
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock_state().active.is_some()
    }

    pub fn last_snapshot(&self) -> Option<QuerySnapshot> {
        self.inner.lock_state().last_snapshot.clone()
    }

    pub fn last_error(&self) -> Option<StoreError> {
        self.inner.lock_state().last_error.clone()
    }

    pub fn active_query(&self) -> Option<Query> {
        self.inner
            .lock_state()
            .active
            .as_ref()
            .map(|active| active.query.clone())
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept_snapshot(&self, generation: u64, snapshot: &QuerySnapshot, callback: &SnapshotCallback) {
        {
            let mut state = self.lock_state();
            if state.generation != generation {
                log::debug!("dropping snapshot from a detached listener");
                return;
            }
            if snapshot.sequence() <= state.last_sequence {
                log::debug!(
                    "dropping out-of-order snapshot {} (already at {})",
                    snapshot.sequence(),
                    state.last_sequence
                );
                return;
            }
            state.last_sequence = snapshot.sequence();
            state.last_snapshot = Some(snapshot.clone());
            state.last_error = None;
            state.loading = false;
        }
        callback(snapshot);
    }

    // Returns whether the error belonged to the current subscription.
    fn record_error(&self, generation: Option<u64>, error: &StoreError) -> bool {
        {
            let mut state = self.lock_state();
            if generation.is_some_and(|generation| generation != state.generation) {
                return false;
            }
            state.last_error = Some(error.clone());
            state.loading = false;
        }
        log::warn!("query failed: {error}");
        let callback = self
            .on_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(error);
        }
        true
    }

    async fn fetch(&self, query: Query, callback: SnapshotCallback) -> StoreResult<QuerySnapshot> {
        self.lock_state().loading = true;
        match self.store.list(&query).await {
            Ok(snapshot) => {
                {
                    let mut state = self.lock_state();
                    state.last_snapshot = Some(snapshot.clone());
                    state.last_error = None;
                    state.loading = false;
                }
                callback(&snapshot);
                Ok(snapshot)
            }
            Err(err) => {
                self.record_error(None, &err);
                Err(err)
            }
        }
    }

    async fn refresh(&self) -> StoreResult<Option<QuerySnapshot>> {
        let fetch = self.lock_state().fetch.clone();
        match fetch {
            Some((query, callback)) => self.fetch(query, callback).await.map(Some),
            None => Ok(None),
        }
    }

    fn register_recurring(&self) -> CancellationFlag {
        let flag = CancellationFlag::new();
        self.recurring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(flag.clone());
        flag
    }
}

fn to_store_error(error: &(dyn Error + 'static)) -> StoreError {
    error
        .downcast_ref::<StoreError>()
        .cloned()
        .unwrap_or_else(|| unavailable(error.to_string()))
}

/// Snapshots of one subscription as an async stream.
pub struct SnapshotStream {
    receiver: Pin<Box<async_channel::Receiver<StoreResult<QuerySnapshot>>>>,
}

impl Stream for SnapshotStream {
    type Item = StoreResult<QuerySnapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}
