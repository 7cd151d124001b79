use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::api::{DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::StoreResult;
use crate::store::model::DocumentKey;
use crate::store::value::MapValue;
use crate::sync::{report_result, FieldKind, FieldSchema, Notifier, SyncSettings, SynchronizedList};
use crate::views::group_by;

use super::document::Collection;
use super::mail::MailQueue;

/// Id of the single free-form inventory note in `notes`.
pub const NOTE_ID: &str = "currentNote";
pub const REPORT_SUBJECT: &str = "Mission Cafe Inventory Update";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InventoryItem {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub par: Option<i64>,
    pub current: Option<i64>,
    pub units: Option<String>,
    pub notes: String,
    pub supplier: Option<String>,
}

impl InventoryItem {
    /// Stock is below par; items without a par level never are.
    pub fn is_below_par(&self) -> bool {
        match (self.current, self.par) {
            (Some(current), Some(par)) => current < par,
            (None, Some(par)) => par > 0,
            _ => false,
        }
    }
}

impl DocumentModel for InventoryItem {
    fn collection() -> &'static str {
        Collection::Inventory.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            name: reader.text("name")?,
            category: reader.string("category")?,
            par: reader.integer("par")?,
            current: reader.integer("current")?,
            units: reader.string("units")?,
            notes: reader.text("notes")?,
            supplier: reader.string("supplier")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("name", self.name.as_str())
            .with_optional("category", self.category.as_deref())
            .with_optional("par", self.par)
            .with_optional("current", self.current)
            .with_optional("units", self.units.as_deref())
            .with("notes", self.notes.as_str())
            .with_optional("supplier", self.supplier.as_deref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryNote {
    pub id: String,
    pub note: String,
}

impl DocumentModel for InventoryNote {
    fn collection() -> &'static str {
        Collection::Notes.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            note: reader.text("note")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty().with("note", self.note.as_str())
    }
}

pub fn inventory_schema() -> FieldSchema {
    FieldSchema::new()
        .debounced("current", FieldKind::Integer)
        .debounced("notes", FieldKind::Text)
}

pub fn inventory_query() -> StoreResult<Query> {
    Ok(Query::new(InventoryItem::collection())?.order_by_asc("name"))
}

/// Live inventory count sheet.
pub struct InventoryScreen {
    list: SynchronizedList,
    mail: MailQueue,
    notifier: Arc<dyn Notifier>,
}

impl InventoryScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        let mail = MailQueue::new(Arc::clone(&store));
        let list = SynchronizedList::new(
            store,
            InventoryItem::collection(),
            inventory_schema(),
            settings,
            Arc::clone(&notifier),
        );
        Self {
            list,
            mail,
            notifier,
        }
    }

    pub async fn open(&self) -> StoreResult<()> {
        self.list.open(inventory_query()?).await
    }

    pub fn list(&self) -> &SynchronizedList {
        &self.list
    }

    pub fn items(&self) -> Vec<InventoryItem> {
        self.list.view().decode()
    }

    pub fn by_category(&self) -> BTreeMap<String, Vec<InventoryItem>> {
        group_by(&self.items(), |item| item.category.as_deref())
    }

    pub fn below_par(&self) -> Vec<InventoryItem> {
        self.items()
            .into_iter()
            .filter(InventoryItem::is_below_par)
            .collect()
    }

    /// Count as typed; blank input clears it.
    pub fn set_current(&self, item_id: &str, input: &str) -> StoreResult<()> {
        self.list.edit(item_id, "current", input)
    }

    pub fn set_notes(&self, item_id: &str, notes: &str) -> StoreResult<()> {
        self.list.edit(item_id, "notes", notes)
    }

    pub async fn commit(&self, item_id: &str) {
        self.list.commit(item_id).await;
    }

    pub async fn load_note(&self) -> StoreResult<InventoryNote> {
        let result = async {
            let snapshot = self.list.store().get(&note_key()?).await?;
            if snapshot.exists() {
                InventoryNote::from_snapshot(&snapshot)
            } else {
                Ok(InventoryNote {
                    id: NOTE_ID.to_string(),
                    note: String::new(),
                })
            }
        }
        .await;
        report_result(self.notifier.as_ref(), result, None, "Error fetching extra notes")
    }

    pub async fn save_note(&self, note: &str) -> StoreResult<()> {
        let note = InventoryNote {
            id: NOTE_ID.to_string(),
            note: note.to_string(),
        };
        let result = match note_key() {
            Ok(key) => self.list.store().set(&key, note.to_fields()).await,
            Err(err) => Err(err),
        };
        report_result(self.notifier.as_ref(), result, None, "Error saving notes")
    }

    /// Mails the caller-rendered report to every manager, replacing queued mail.
    pub async fn send_to_managers(&self, html: &str) -> StoreResult<DocumentKey> {
        self.list.flush_all().await;
        let result = self.mail.send_to_managers(REPORT_SUBJECT, html).await;
        report_result(
            self.notifier.as_ref(),
            result,
            Some("Inventory sent to managers!"),
            "Error sending inventory email",
        )
    }

    pub async fn close(&self) {
        self.list.close().await;
    }
}

fn note_key() -> StoreResult<DocumentKey> {
    DocumentKey::new(InventoryNote::collection(), NOTE_ID)
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    use crate::store::datastore::InMemoryStore;
    use crate::sync::{Notification, NotificationQueue};

    #[tokio::test]
    async fn note_and_report_failures_are_notified() {
        let store = Arc::new(InMemoryStore::new());
        let notifications = NotificationQueue::new();
        let screen = InventoryScreen::new(
            store.clone(),
            SyncSettings::default(),
            Arc::new(notifications.clone()),
        );
        screen.save_note("Order cups").await.unwrap();
        assert_eq!(screen.load_note().await.unwrap().note, "Order cups");
        assert!(notifications.is_empty());

        store.disable_network();
        assert!(screen.save_note("Order lids").await.is_err());
        assert!(screen.load_note().await.is_err());
        assert!(screen.send_to_managers("<p/>").await.is_err());
        assert_eq!(
            notifications.drain(),
            vec![
                Notification::error("Error saving notes"),
                Notification::error("Error fetching extra notes"),
                Notification::error("Error sending inventory email"),
            ]
        );
    }

    #[test]
    fn below_par_compares_current_with_par() {
        let mut item = InventoryItem {
            par: Some(6),
            current: Some(4),
            ..Default::default()
        };
        assert!(item.is_below_par());
        item.current = Some(6);
        assert!(!item.is_below_par());
        item.par = None;
        assert!(!item.is_below_par());
    }

    #[test]
    fn decodes_whole_doubles_as_counts() {
        let fields = MapValue::empty()
            .with("name", "Oat milk")
            .with("par", 12.0)
            .with("current", 3i64);
        let item = InventoryItem::from_fields("oat", &fields).unwrap();
        assert_eq!(item.par, Some(12));
        assert_eq!(item.notes, "");
    }
}
