use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::api::{decode_snapshot, DocumentModel, FieldReader, Query, QuerySnapshot};
use crate::store::datastore::RemoteStore;
use crate::store::error::StoreResult;
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::query_evaluator::DOCUMENT_ID_FIELD;
use crate::store::value::MapValue;
use crate::sync::{Notification, Notifier, SubscriptionManager};

use super::document::Collection;

/// Id of the single message shown on the board.
pub const MESSAGE_ID: &str = "currentMessage";
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerMessage {
    pub id: String,
    pub message: String,
    pub last_updated: Option<Timestamp>,
}

impl DocumentModel for ManagerMessage {
    fn collection() -> &'static str {
        Collection::ManagerMessages.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            message: reader.text("message")?,
            last_updated: reader.timestamp("lastUpdated")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("message", self.message.as_str())
            .with_optional("lastUpdated", self.last_updated)
    }
}

/// The manager message board: one message, fetched on open and again every hour.
pub struct MessageBoard {
    store: Arc<dyn RemoteStore>,
    subscriptions: SubscriptionManager,
    notifier: Arc<dyn Notifier>,
    current: Arc<Mutex<Option<ManagerMessage>>>,
}

impl MessageBoard {
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(Arc::clone(&store)),
            store,
            notifier,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetches the message and keeps it fresh every [`REFRESH_INTERVAL`].
    pub async fn open(&self) -> StoreResult<()> {
        self.open_with_interval(REFRESH_INTERVAL).await
    }

    pub async fn open_with_interval(&self, interval: Duration) -> StoreResult<()> {
        let query = Query::new(ManagerMessage::collection())?.where_eq(DOCUMENT_ID_FIELD, MESSAGE_ID);
        let current: Weak<Mutex<Option<ManagerMessage>>> = Arc::downgrade(&self.current);
        self.subscriptions
            .fetch_once(query, move |snapshot| {
                if let Some(current) = current.upgrade() {
                    store_message(&current, snapshot);
                }
            })
            .await?;
        self.subscriptions.refresh_every(interval);
        Ok(())
    }

    /// The message text; empty until one is saved.
    pub fn message(&self) -> String {
        self.current()
            .map(|message| message.message)
            .unwrap_or_default()
    }

    pub fn current(&self) -> Option<ManagerMessage> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the message and stamps it with `now`.
    pub async fn save(&self, text: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let message = ManagerMessage {
            id: MESSAGE_ID.to_string(),
            message: text.to_string(),
            last_updated: Some(Timestamp::from(now)),
        };
        let key = DocumentKey::new(ManagerMessage::collection(), MESSAGE_ID)?;
        match self.store.set(&key, message.to_fields()).await {
            Ok(()) => {
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
                self.notifier.notify(Notification::success("Message saved"));
                Ok(())
            }
            Err(err) => {
                log::warn!("saving the manager message failed: {err}");
                self.notifier
                    .notify(Notification::error("Failed to save message"));
                Err(err)
            }
        }
    }

    pub fn close(&self) {
        self.subscriptions.teardown();
    }
}

fn store_message(current: &Mutex<Option<ManagerMessage>>, snapshot: &QuerySnapshot) {
    let message = decode_snapshot::<ManagerMessage>(snapshot).into_iter().next();
    *current.lock().unwrap_or_else(PoisonError::into_inner) = message;
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::platform::runtime::sleep;
    use crate::store::datastore::InMemoryStore;
    use crate::sync::{NotificationLevel, NotificationQueue};

    #[tokio::test(start_paused = true)]
    async fn refetches_on_the_interval() {
        let store = Arc::new(InMemoryStore::new());
        let notifications = Arc::new(NotificationQueue::new());
        let board = MessageBoard::new(store.clone(), notifications.clone());
        board.open_with_interval(Duration::from_secs(60)).await.unwrap();
        assert_eq!(board.message(), "");

        let key = DocumentKey::new("managerMessages", MESSAGE_ID).unwrap();
        store
            .set(&key, MapValue::empty().with("message", "Deep clean Friday"))
            .await
            .unwrap();
        assert_eq!(board.message(), "");

        sleep(Duration::from_secs(61)).await;
        assert_eq!(board.message(), "Deep clean Friday");
        board.close();
    }

    #[tokio::test]
    async fn save_stamps_and_notifies() {
        let store = Arc::new(InMemoryStore::new());
        let notifications = Arc::new(NotificationQueue::new());
        let board = MessageBoard::new(store.clone(), notifications.clone());
        let now = Utc::now();
        board.save("Welcome back", now).await.unwrap();

        let stored = ManagerMessage::from_snapshot(
            &store
                .get(&DocumentKey::new("managerMessages", MESSAGE_ID).unwrap())
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored.message, "Welcome back");
        assert_eq!(stored.last_updated, Some(Timestamp::from(now)));
        assert_eq!(notifications.drain()[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn failed_save_notifies_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next_write(crate::store::error::unavailable("offline"));
        let notifications = Arc::new(NotificationQueue::new());
        let board = MessageBoard::new(store.clone(), notifications.clone());
        assert!(board.save("x", Utc::now()).await.is_err());
        assert_eq!(notifications.drain()[0].level, NotificationLevel::Error);
        assert!(board.current().is_none());
    }
}
