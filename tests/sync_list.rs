#![cfg(not(target_arch = "wasm32"))]

mod common;

use std::sync::Arc;
use std::time::Duration;

use cafe_sync::platform::runtime::sleep;
use cafe_sync::store::error::unavailable;
use cafe_sync::store::{DocumentSnapshot, InMemoryStore, MapValue, Query, RemoteStore, Timestamp, Value, WriteOperation};
use cafe_sync::sync::{
    FieldKind, FieldSchema, NotificationLevel, NotificationQueue, RetrySettings, SubscriptionManager, SyncSettings,
    SynchronizedList,
};
use common::{key, ScriptedStore};
use futures::StreamExt;

fn schema() -> FieldSchema {
    FieldSchema::new()
        .debounced("current", FieldKind::Integer)
        .debounced("notes", FieldKind::Text)
        .immediate("complete", FieldKind::Boolean)
}

fn query() -> Query {
    Query::new("inventory").unwrap().order_by_asc("name")
}

async fn seed(store: &dyn RemoteStore, ids: &[&str]) {
    for id in ids {
        store
            .set(
                &key("inventory", id),
                MapValue::empty()
                    .with("name", *id)
                    .with("current", 1i64)
                    .with("notes", "")
                    .with("complete", true),
            )
            .await
            .unwrap();
    }
}

async fn open_list(store: Arc<dyn RemoteStore>, settings: SyncSettings) -> (SynchronizedList, NotificationQueue) {
    let notifications = NotificationQueue::new();
    let list = SynchronizedList::new(store, "inventory", schema(), settings, Arc::new(notifications.clone()));
    list.open(query()).await.unwrap();
    (list, notifications)
}

fn current_of(list: &SynchronizedList, id: &str) -> Option<Value> {
    list.view().get(id).and_then(|doc| doc.get("current").cloned())
}

#[tokio::test(start_paused = true)]
async fn edits_to_one_document_coalesce_into_one_write() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let (list, _) = open_list(store.clone(), SyncSettings::default()).await;
    let before = store.committed_writes().len();

    list.edit("flour", "current", "2").unwrap();
    list.edit("flour", "current", "3").unwrap();
    list.edit("flour", "notes", "running low").unwrap();
    sleep(Duration::from_secs(1)).await;

    let writes = store.committed_writes()[before..].to_vec();
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        WriteOperation::Update { data, .. } => {
            assert_eq!(data.get("current"), Some(&Value::from_integer(3)));
            assert_eq!(data.get("notes"), Some(&Value::from_string("running low")));
        }
        other => panic!("expected an update, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_snapshots_are_ignored() {
    let store = ScriptedStore::new(true);
    seed(store.as_ref(), &["flour"]).await;
    let (list, _) = open_list(store.clone(), SyncSettings::default()).await;

    let version = |current: i64, version: u64| {
        vec![DocumentSnapshot::new(
            key("inventory", "flour"),
            MapValue::empty().with("name", "flour").with("current", current),
            version,
            Timestamp::now(),
        )]
    };
    store.push(version(9, 3), 3);
    store.push(version(5, 2), 2);
    assert_eq!(current_of(&list, "flour"), Some(Value::from_integer(9)));

    store.push(version(12, 4), 4);
    assert_eq!(current_of(&list, "flour"), Some(Value::from_integer(12)));
}

#[tokio::test(start_paused = true)]
async fn remote_change_supersedes_a_pending_edit() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    list.edit("flour", "notes", "mine").unwrap();
    std::thread::sleep(Duration::from_millis(2));
    store
        .update(&key("inventory", "flour"), MapValue::empty().with("notes", "theirs"))
        .await
        .unwrap();

    let view = list.view();
    let flour = view.get("flour").unwrap();
    assert_eq!(flour.get_str("notes"), Some("theirs"));
    assert!(!flour.is_pending("notes"));
    assert!(!list.has_pending_writes());

    sleep(Duration::from_secs(10)).await;
    let stored = store.get(&key("inventory", "flour")).await.unwrap();
    assert_eq!(stored.get("notes"), Some(&Value::from_string("theirs")));
    assert!(notifications
        .drain()
        .iter()
        .any(|notification| notification.level == NotificationLevel::Info));
}

#[tokio::test(start_paused = true)]
async fn failed_writes_stay_visible_until_retried() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    store.fail_next_write(unavailable("offline"));
    list.edit("flour", "current", 8i64).unwrap();
    list.commit("flour").await;

    let view = list.view();
    let flour = view.get("flour").unwrap();
    assert_eq!(flour.get("current"), Some(&Value::from_integer(8)));
    assert!(flour.has_failed("current"));
    assert_eq!(notifications.drain()[0].level, NotificationLevel::Error);

    assert_eq!(list.retry_failed("flour"), 1);
    list.commit("flour").await;
    let stored = store.get(&key("inventory", "flour")).await.unwrap();
    assert_eq!(stored.get("current"), Some(&Value::from_integer(8)));
    assert!(!list.view().get("flour").unwrap().has_failed("current"));
}

#[tokio::test(start_paused = true)]
async fn transport_failures_are_retried_with_backoff() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let retry = RetrySettings {
        max_attempts: 3,
        ..RetrySettings::default()
    };
    let settings = SyncSettings::new(500, Some(5_000), retry).unwrap();
    let (list, notifications) = open_list(store.clone(), settings).await;

    store.fail_next_write(unavailable("flaky"));
    list.edit("flour", "current", 4i64).unwrap();
    sleep(Duration::from_secs(5)).await;

    let stored = store.get(&key("inventory", "flour")).await.unwrap();
    assert_eq!(stored.get("current"), Some(&Value::from_integer(4)));
    assert!(notifications.is_empty());
}

#[tokio::test(start_paused = true)]
async fn closing_flushes_and_detaches() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour", "sugar"]).await;
    let (list, _) = open_list(store.clone(), SyncSettings::default()).await;

    list.edit("flour", "current", 20i64).unwrap();
    list.edit("sugar", "notes", "reorder").unwrap();
    list.close().await;

    assert_eq!(store.listener_count(), 0);
    let flour = store.get(&key("inventory", "flour")).await.unwrap();
    let sugar = store.get(&key("inventory", "sugar")).await.unwrap();
    assert_eq!(flour.get("current"), Some(&Value::from_integer(20)));
    assert_eq!(sugar.get("notes"), Some(&Value::from_string("reorder")));
}

#[tokio::test]
async fn invalid_input_schedules_nothing() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    let err = list.edit("flour", "current", "a dozen").unwrap_err();
    assert!(err.is_validation());
    assert!(!list.has_pending_writes());
    assert_eq!(current_of(&list, "flour"), Some(Value::from_integer(1)));
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn atomic_reset_writes_every_visible_document() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["a", "b", "c"]).await;
    let (list, _) = open_list(store.clone(), SyncSettings::default()).await;

    list.reset_all("complete", false).await.unwrap();
    for id in ["a", "b", "c"] {
        let stored = store.get(&key("inventory", id)).await.unwrap();
        assert_eq!(stored.get("complete"), Some(&Value::from_bool(false)));
    }
}

#[tokio::test]
async fn partial_reset_is_rolled_back() {
    let store = ScriptedStore::new(false);
    seed(store.as_ref(), &["a", "b", "c"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    store.fail_update(2);
    assert!(list.reset_all("complete", false).await.is_err());

    for id in ["a", "b", "c"] {
        let stored = store.get(&key("inventory", id)).await.unwrap();
        assert_eq!(stored.get("complete"), Some(&Value::from_bool(true)), "{id}");
        let shown = list.view();
        assert_eq!(shown.get(id).unwrap().get("complete"), Some(&Value::from_bool(true)));
    }
    assert_eq!(notifications.drain()[0].level, NotificationLevel::Error);
}

#[tokio::test]
async fn rollback_snapshots_raise_no_supersession_notices() {
    let store = ScriptedStore::relaying(false);
    seed(store.as_ref(), &["a", "b", "c"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    store.fail_update(2);
    assert!(list.reset_all("complete", false).await.is_err());

    let drained = notifications.drain();
    assert_eq!(drained.len(), 1, "{drained:?}");
    assert_eq!(drained[0].level, NotificationLevel::Error);
    for id in ["a", "b", "c"] {
        let shown = list.view();
        assert_eq!(shown.get(id).unwrap().get("complete"), Some(&Value::from_bool(true)), "{id}");
    }
}

#[tokio::test]
async fn failed_reset_brings_back_earlier_failed_edits() {
    let store = ScriptedStore::new(false);
    seed(store.as_ref(), &["a", "b"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    store.fail_update(0);
    list.toggle("a", "complete", false).unwrap();
    list.commit("a").await;
    assert!(list.view().get("a").unwrap().has_failed("complete"));

    store.fail_update(1);
    assert!(list.reset_all("complete", false).await.is_err());
    let view = list.view();
    let a = view.get("a").unwrap();
    assert!(a.has_failed("complete"));
    assert_eq!(a.get("complete"), Some(&Value::from_bool(false)));
    assert!(!view.get("b").unwrap().is_pending("complete"));
    notifications.drain();

    assert_eq!(list.retry_failed("a"), 1);
    list.commit("a").await;
    let stored = store.get(&key("inventory", "a")).await.unwrap();
    assert_eq!(stored.get("complete"), Some(&Value::from_bool(false)));
}

#[tokio::test(start_paused = true)]
async fn unsent_keystrokes_do_not_hide_a_remote_change() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let (list, notifications) = open_list(store.clone(), SyncSettings::default()).await;

    list.edit("flour", "current", 4i64).unwrap();
    list.edit("flour", "current", 45i64).unwrap();
    std::thread::sleep(Duration::from_millis(2));
    store
        .update(&key("inventory", "flour"), MapValue::empty().with("current", 4i64))
        .await
        .unwrap();

    assert_eq!(current_of(&list, "flour"), Some(Value::from_integer(4)));
    assert!(!list.has_pending_writes());
    sleep(Duration::from_secs(10)).await;
    let stored = store.get(&key("inventory", "flour")).await.unwrap();
    assert_eq!(stored.get("current"), Some(&Value::from_integer(4)));
    assert!(notifications
        .drain()
        .iter()
        .any(|notification| notification.level == NotificationLevel::Info));
}

#[tokio::test]
async fn one_shot_lists_keep_confirmed_values() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let list = SynchronizedList::new(
        store.clone(),
        "inventory",
        schema(),
        SyncSettings::default(),
        Arc::new(NotificationQueue::new()),
    );
    list.load_once(query()).await.unwrap();
    assert_eq!(store.listener_count(), 0);

    list.edit("flour", "current", 6i64).unwrap();
    list.commit("flour").await;
    let view = list.view();
    let flour = view.get("flour").unwrap();
    assert_eq!(flour.get("current"), Some(&Value::from_integer(6)));
    assert!(!flour.is_pending("current"));
}

#[tokio::test]
async fn snapshot_stream_yields_initial_and_changes() {
    let store = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), &["flour"]).await;
    let manager = SubscriptionManager::new(store.clone());
    let mut stream = manager.snapshots(query()).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 1);

    seed(store.as_ref(), &["sugar"]).await;
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.len(), 2);

    manager.teardown();
    assert_eq!(store.listener_count(), 0);
}
