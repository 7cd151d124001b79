use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::api::{DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::StoreResult;
use crate::store::value::MapValue;
use crate::sync::{FieldKind, FieldSchema, Notifier, SyncSettings, SynchronizedList};
use crate::views::group_by;

use super::document::Collection;

/// Checklist tab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChecklistCategory {
    Opening,
    Closing,
}

impl ChecklistCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecklistCategory::Opening => "Opening",
            ChecklistCategory::Closing => "Closing",
        }
    }
}

impl Display for ChecklistCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub order: Option<i64>,
    pub text: String,
    pub complete: bool,
}

impl DocumentModel for ChecklistItem {
    fn collection() -> &'static str {
        Collection::Checklists.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            category: reader.text("category")?,
            sub_category: reader.string("subCategory")?,
            order: reader.integer("order")?,
            text: reader.text("text")?,
            complete: reader.boolean("complete")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("category", self.category.as_str())
            .with_optional("subCategory", self.sub_category.as_deref())
            .with_optional("order", self.order)
            .with("text", self.text.as_str())
            .with("complete", self.complete)
    }
}

pub fn checklist_schema() -> FieldSchema {
    FieldSchema::new().immediate("complete", FieldKind::Boolean)
}

pub fn checklist_query(tab: ChecklistCategory) -> StoreResult<Query> {
    Ok(Query::new(ChecklistItem::collection())?
        .where_eq("category", tab.as_str())
        .order_by_asc("order"))
}

/// Opening and closing checklists, one tab at a time.
pub struct ChecklistScreen {
    list: SynchronizedList,
    tab: Mutex<ChecklistCategory>,
}

impl ChecklistScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                ChecklistItem::collection(),
                checklist_schema(),
                settings,
                notifier,
            ),
            tab: Mutex::new(ChecklistCategory::Opening),
        }
    }

    pub fn list(&self) -> &SynchronizedList {
        &self.list
    }

    pub fn tab(&self) -> ChecklistCategory {
        *self.tab.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shows `tab`, replacing the live query of the previous one.
    pub async fn open(&self, tab: ChecklistCategory) -> StoreResult<()> {
        *self.tab.lock().unwrap_or_else(PoisonError::into_inner) = tab;
        self.list.change_query(checklist_query(tab)?).await
    }

    pub fn items(&self) -> Vec<ChecklistItem> {
        self.list.view().decode()
    }

    pub fn by_sub_category(&self) -> BTreeMap<String, Vec<ChecklistItem>> {
        group_by(&self.items(), |item| item.sub_category.as_deref())
    }

    /// Completed and total item counts of the current tab.
    pub fn progress(&self) -> (usize, usize) {
        let items = self.items();
        let done = items.iter().filter(|item| item.complete).count();
        (done, items.len())
    }

    pub fn set_complete(&self, item_id: &str, complete: bool) -> StoreResult<()> {
        self.list.toggle(item_id, "complete", complete)
    }

    /// Unchecks every item of the current tab in one all-or-nothing write.
    pub async fn reset(&self) -> StoreResult<()> {
        self.list.reset_all("complete", false).await
    }

    pub async fn close(&self) {
        self.list.close().await;
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::store::datastore::InMemoryStore;
    use crate::store::model::DocumentKey;
    use crate::store::value::Value;
    use crate::sync::NotificationQueue;

    async fn seeded() -> (Arc<InMemoryStore>, ChecklistScreen) {
        let store = Arc::new(InMemoryStore::new());
        let items = [
            ("o1", "Opening", "Bar", 2, true),
            ("o2", "Opening", "Bar", 1, true),
            ("o3", "Opening", "Front", 3, false),
            ("c1", "Closing", "Bar", 1, true),
        ];
        for (id, category, sub, order, complete) in items {
            let item = ChecklistItem {
                id: id.into(),
                category: category.into(),
                sub_category: Some(sub.into()),
                order: Some(order),
                text: format!("task {id}"),
                complete,
            };
            let key = DocumentKey::new("checklists", id).unwrap();
            store.set(&key, item.to_fields()).await.unwrap();
        }
        let screen = ChecklistScreen::new(
            store.clone(),
            SyncSettings::default(),
            Arc::new(NotificationQueue::new()),
        );
        screen.open(ChecklistCategory::Opening).await.unwrap();
        (store, screen)
    }

    #[tokio::test]
    async fn tab_filters_and_orders_items() {
        let (_store, screen) = seeded().await;
        let ids: Vec<_> = screen.items().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, vec!["o2", "o1", "o3"]);
        assert_eq!(screen.progress(), (2, 3));
        assert_eq!(screen.by_sub_category()["Bar"].len(), 2);

        screen.open(ChecklistCategory::Closing).await.unwrap();
        assert_eq!(screen.tab(), ChecklistCategory::Closing);
        assert_eq!(screen.items().len(), 1);
        screen.close().await;
    }

    #[tokio::test]
    async fn reset_unchecks_only_the_current_tab() {
        let (store, screen) = seeded().await;
        let before = store.committed_writes().len();
        screen.reset().await.unwrap();
        assert_eq!(screen.progress(), (0, 3));

        let closing = store
            .get(&DocumentKey::new("checklists", "c1").unwrap())
            .await
            .unwrap();
        assert_eq!(closing.get("complete"), Some(&Value::from_bool(true)));
        let reset: Vec<_> = store.committed_writes()[before..]
            .iter()
            .map(|write| write.key().id().to_string())
            .collect();
        assert_eq!(reset.len(), 3);
        assert!(!reset.contains(&"c1".to_string()));
        screen.close().await;
    }

    #[tokio::test]
    async fn toggles_write_without_waiting_for_the_debounce() {
        let (store, screen) = seeded().await;
        screen.set_complete("o3", true).unwrap();
        assert_eq!(screen.progress(), (3, 3));
        screen.close().await;
        let stored = store
            .get(&DocumentKey::new("checklists", "o3").unwrap())
            .await
            .unwrap();
        assert_eq!(stored.get("complete"), Some(&Value::from_bool(true)));
    }
}
