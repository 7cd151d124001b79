use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::store::api::{decode_snapshot, DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{not_found, StoreResult};
use crate::store::model::Timestamp;
use crate::store::value::{MapValue, Value};
use crate::sync::{FieldKind, FieldSchema, Notifier, SyncSettings, SynchronizedList};

use super::associates::Associate;
use super::document::Collection;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecialEvent {
    pub id: String,
    pub event: String,
    pub event_type: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub contact_person: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub order_details: String,
    pub payment: String,
    /// Associate ids.
    pub staff: Vec<String>,
    pub order_complete: bool,
}

impl SpecialEvent {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.end_time
            .or(self.start_time)
            .is_some_and(|time| time.to_datetime() >= now)
    }
}

impl DocumentModel for SpecialEvent {
    fn collection() -> &'static str {
        Collection::SpecialEvents.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            event: reader.text("event")?,
            event_type: reader.text("eventType")?,
            start_time: reader.timestamp("startTime")?,
            end_time: reader.timestamp("endTime")?,
            contact_person: reader.text("contactPerson")?,
            contact_email: reader.text("contactEmail")?,
            contact_phone: reader.text("contactPhone")?,
            order_details: reader.text("orderDetails")?,
            payment: reader.text("payment")?,
            staff: reader.string_list("staff")?,
            order_complete: reader.boolean("orderComplete")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("event", self.event.as_str())
            .with("eventType", self.event_type.as_str())
            .with_optional("startTime", self.start_time)
            .with_optional("endTime", self.end_time)
            .with("contactPerson", self.contact_person.as_str())
            .with("contactEmail", self.contact_email.as_str())
            .with("contactPhone", self.contact_phone.as_str())
            .with("orderDetails", self.order_details.as_str())
            .with("payment", self.payment.as_str())
            .with("staff", Value::from_strings(self.staff.iter().map(String::as_str)))
            .with("orderComplete", self.order_complete)
    }
}

pub fn specials_schema() -> FieldSchema {
    FieldSchema::new()
        .debounced("event", FieldKind::Text)
        .debounced("eventType", FieldKind::Text)
        .debounced("contactPerson", FieldKind::Text)
        .debounced("contactEmail", FieldKind::Email)
        .debounced("contactPhone", FieldKind::Phone)
        .debounced("orderDetails", FieldKind::Text)
        .debounced("payment", FieldKind::Text)
        .immediate("startTime", FieldKind::Timestamp)
        .immediate("endTime", FieldKind::Timestamp)
        .immediate("staff", FieldKind::StringList)
        .immediate("orderComplete", FieldKind::Boolean)
}

pub fn specials_query() -> StoreResult<Query> {
    Ok(Query::new(SpecialEvent::collection())?.order_by_asc("startTime"))
}

/// Live list of catering and special events with their assigned staff.
pub struct SpecialsScreen {
    list: SynchronizedList,
    associates: Mutex<BTreeMap<String, Associate>>,
}

impl SpecialsScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                SpecialEvent::collection(),
                specials_schema(),
                settings,
                notifier,
            ),
            associates: Mutex::new(BTreeMap::new()),
        }
    }

    /// Loads the associates roster, then starts the live event query.
    pub async fn open(&self) -> StoreResult<()> {
        self.reload_associates().await?;
        self.list.open(specials_query()?).await
    }

    pub async fn reload_associates(&self) -> StoreResult<()> {
        let query = Query::new(Associate::collection())?.order_by_asc("lastName");
        let snapshot = self.list.store().list(&query).await?;
        let roster: BTreeMap<String, Associate> = decode_snapshot::<Associate>(&snapshot)
            .into_iter()
            .map(|associate| (associate.id.clone(), associate))
            .collect();
        *self.associates.lock().unwrap_or_else(PoisonError::into_inner) = roster;
        Ok(())
    }

    pub fn list(&self) -> &SynchronizedList {
        &self.list
    }

    pub fn events(&self) -> Vec<SpecialEvent> {
        self.list.view().decode()
    }

    /// Associates available for staffing, soft-deleted ones excluded.
    pub fn roster(&self) -> Vec<Associate> {
        self.associates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|associate| !associate.deleted)
            .cloned()
            .collect()
    }

    /// Staff assigned to `event`, in assignment order. Unknown ids are skipped.
    pub fn resolve_staff(&self, event: &SpecialEvent) -> Vec<Associate> {
        let roster = self.associates.lock().unwrap_or_else(PoisonError::into_inner);
        event
            .staff
            .iter()
            .filter_map(|id| roster.get(id).cloned())
            .collect()
    }

    pub fn edit(&self, event_id: &str, field: &str, input: &str) -> StoreResult<()> {
        self.list.edit(event_id, field, input)
    }

    pub fn set_time(&self, event_id: &str, field: &str, time: DateTime<Utc>) -> StoreResult<()> {
        self.list.edit(event_id, field, Timestamp::from(time))
    }

    /// Adds the associate to the event's staff, or removes them if already assigned.
    pub fn toggle_staff(&self, event_id: &str, associate_id: &str) -> StoreResult<()> {
        let event = self
            .events()
            .into_iter()
            .find(|event| event.id == event_id)
            .ok_or_else(|| not_found(format!("special event {event_id} is not listed")))?;
        let mut staff = event.staff;
        match staff.iter().position(|id| id == associate_id) {
            Some(index) => {
                staff.remove(index);
            }
            None => staff.push(associate_id.to_string()),
        }
        self.list.edit(
            event_id,
            "staff",
            Value::from_strings(staff.iter().map(String::as_str)),
        )
    }

    pub fn set_order_complete(&self, event_id: &str, complete: bool) -> StoreResult<()> {
        self.list.toggle(event_id, "orderComplete", complete)
    }

    pub async fn commit(&self, event_id: &str) {
        self.list.commit(event_id).await;
    }

    pub async fn close(&self) {
        self.list.close().await;
    }
}
