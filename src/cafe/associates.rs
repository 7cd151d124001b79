use std::sync::Arc;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::store::api::{DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::StoreResult;
use crate::store::model::Timestamp;
use crate::store::value::{MapValue, Value};
use crate::sync::{FieldKind, FieldSchema, Notifier, SyncSettings, SynchronizedList};

use super::document::Collection;

/// Associates younger than this (by calendar year) are flagged as minors.
pub const MINOR_AGE_YEARS: i32 = 15;
/// A background check older than this no longer clears an associate.
pub const BACKGROUND_CHECK_VALID_MONTHS: u32 = 24;
const EMAIL_SEPARATOR: &str = "; ";

/// Volunteer screening state shown next to each associate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clearance {
    Minor,
    Cleared,
    NotCleared,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Associate {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// As entered, normally `YYYY-MM-DD`.
    pub birthdate: String,
    pub availability: String,
    pub notes: String,
    pub minor: bool,
    pub background_check: String,
    pub background_check_date: Option<Timestamp>,
    pub deleted: bool,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl Associate {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.birthdate.trim(), "%Y-%m-%d").ok()
    }

    pub fn clearance(&self, now: DateTime<Utc>) -> Clearance {
        let young = self
            .birth_date()
            .is_some_and(|born| now.year() - born.year() < MINOR_AGE_YEARS);
        if young {
            return Clearance::Minor;
        }
        let cutoff = now.checked_sub_months(Months::new(BACKGROUND_CHECK_VALID_MONTHS));
        match (self.background_check_date, cutoff) {
            (Some(checked), Some(cutoff)) if checked.to_datetime() > cutoff => Clearance::Cleared,
            _ => Clearance::NotCleared,
        }
    }

    fn blank(now: Timestamp) -> MapValue {
        MapValue::empty()
            .with("firstName", "")
            .with("lastName", "")
            .with("email", "")
            .with("phone", "")
            .with("birthdate", "")
            .with("availability", "")
            .with("notes", "")
            .with("minor", false)
            .with("backgroundCheck", "")
            .with("deleted", false)
            .with("createdAt", now)
            .with("updatedAt", now)
    }
}

// Blank dates were historically stored as empty strings.
fn optional_timestamp(reader: &FieldReader<'_>, fields: &MapValue, field: &str) -> StoreResult<Option<Timestamp>> {
    match fields.get(field).and_then(Value::as_str) {
        Some(text) if text.trim().is_empty() => Ok(None),
        _ => reader.timestamp(field),
    }
}

impl DocumentModel for Associate {
    fn collection() -> &'static str {
        Collection::Associates.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            first_name: reader.text("firstName")?,
            last_name: reader.text("lastName")?,
            email: reader.text("email")?,
            phone: reader.text("phone")?,
            birthdate: reader.text("birthdate")?,
            availability: reader.text("availability")?,
            notes: reader.text("notes")?,
            minor: reader.boolean("minor")?,
            background_check: reader.text("backgroundCheck")?,
            background_check_date: optional_timestamp(&reader, fields, "backgroundCheckDate")?,
            deleted: reader.boolean("deleted")?,
            created_at: optional_timestamp(&reader, fields, "createdAt")?,
            updated_at: optional_timestamp(&reader, fields, "updatedAt")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("firstName", self.first_name.as_str())
            .with("lastName", self.last_name.as_str())
            .with("email", self.email.as_str())
            .with("phone", self.phone.as_str())
            .with("birthdate", self.birthdate.as_str())
            .with("availability", self.availability.as_str())
            .with("notes", self.notes.as_str())
            .with("minor", self.minor)
            .with("backgroundCheck", self.background_check.as_str())
            .with_optional("backgroundCheckDate", self.background_check_date)
            .with("deleted", self.deleted)
            .with_optional("createdAt", self.created_at)
            .with_optional("updatedAt", self.updated_at)
    }
}

pub fn associate_schema() -> FieldSchema {
    FieldSchema::new()
        .debounced("firstName", FieldKind::Text)
        .debounced("lastName", FieldKind::Text)
        .debounced("email", FieldKind::Email)
        .debounced("phone", FieldKind::Phone)
        .debounced("birthdate", FieldKind::Text)
        .debounced("availability", FieldKind::Text)
        .debounced("notes", FieldKind::Text)
        .debounced("backgroundCheck", FieldKind::Text)
        .immediate("backgroundCheckDate", FieldKind::Timestamp)
        .immediate("minor", FieldKind::Boolean)
        .immediate("deleted", FieldKind::Boolean)
}

pub fn associates_query() -> StoreResult<Query> {
    Ok(Query::new(Associate::collection())?.order_by_asc("lastName"))
}

/// Associates directory. Loaded once; soft-deleted associates are hidden.
pub struct AssociatesScreen {
    list: SynchronizedList,
}

impl AssociatesScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                Associate::collection(),
                associate_schema(),
                settings,
                notifier,
            ),
        }
    }

    pub async fn load(&self) -> StoreResult<()> {
        self.list.load_once(associates_query()?).await
    }

    pub fn list(&self) -> &SynchronizedList {
        &self.list
    }

    pub fn associates(&self) -> Vec<Associate> {
        self.list
            .view()
            .decode::<Associate>()
            .into_iter()
            .filter(|associate| !associate.deleted)
            .collect()
    }

    /// Edits one text field; email is validated and phone numbers formatted.
    pub fn edit(&self, associate_id: &str, field: &str, input: &str) -> StoreResult<()> {
        self.list.edit(associate_id, field, input)
    }

    pub fn set_minor(&self, associate_id: &str, minor: bool) -> StoreResult<()> {
        self.list.toggle(associate_id, "minor", minor)
    }

    pub fn set_background_check_date(
        &self,
        associate_id: &str,
        date: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.list
            .edit(associate_id, "backgroundCheckDate", date.map(Timestamp::from))
    }

    pub async fn commit(&self, associate_id: &str) {
        self.list.commit(associate_id).await;
    }

    /// Hides the associate without removing the record.
    pub fn soft_delete(&self, associate_id: &str) -> StoreResult<()> {
        self.list.toggle(associate_id, "deleted", true)
    }

    /// Creates an empty associate and reloads the directory; returns the new id.
    pub async fn create_blank(&self, now: DateTime<Utc>) -> StoreResult<String> {
        let key = self
            .list
            .store()
            .add(Associate::collection(), Associate::blank(Timestamp::from(now)))
            .await?;
        self.list.refresh().await?;
        Ok(key.id().to_string())
    }

    /// Email addresses of the listed associates, ready to paste into a mail client.
    pub fn contact_emails(&self) -> String {
        self.associates()
            .into_iter()
            .map(|associate| associate.email)
            .filter(|email| !email.is_empty())
            .collect::<Vec<_>>()
            .join(EMAIL_SEPARATOR)
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
    use crate::sync::NotificationQueue;
    use chrono::TimeZone;

    fn associate(first: &str, last: &str, email: &str) -> Associate {
        Associate {
            first_name: first.into(),
            last_name: last.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    async fn screen() -> (Arc<InMemoryStore>, AssociatesScreen, Arc<NotificationQueue>) {
        let store = Arc::new(InMemoryStore::new());
        for (id, person) in [
            ("a", associate("Ada", "Zimmer", "ada@example.com")),
            ("b", associate("Ben", "Abbot", "")),
            ("c", associate("Cy", "Mills", "cy@example.com")),
        ] {
            let key = DocumentKey::new("associates", id).unwrap();
            store.set(&key, person.to_fields()).await.unwrap();
        }
        let notifications = Arc::new(NotificationQueue::new());
        let screen = AssociatesScreen::new(store.clone(), SyncSettings::default(), notifications.clone());
        screen.load().await.unwrap();
        (store, screen, notifications)
    }

    #[tokio::test]
    async fn lists_by_last_name_and_joins_emails() {
        let (_store, screen, _) = screen().await;
        let names: Vec<_> = screen.associates().into_iter().map(|a| a.last_name).collect();
        assert_eq!(names, vec!["Abbot", "Mills", "Zimmer"]);
        assert_eq!(screen.contact_emails(), "cy@example.com; ada@example.com");
    }

    #[tokio::test]
    async fn soft_delete_hides_and_persists() {
        let (store, screen, _) = screen().await;
        screen.soft_delete("c").unwrap();
        assert_eq!(screen.associates().len(), 2);

        screen.close().await;
        let key = DocumentKey::new("associates", "c").unwrap();
        let stored = store.get(&key).await.unwrap();
        assert_eq!(stored.get("deleted"), Some(&Value::from_bool(true)));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected_and_phone_is_formatted() {
        let (store, screen, notifications) = screen().await;
        assert!(screen.edit("a", "email", "not-an-email").is_err());
        assert_eq!(notifications.drain().len(), 1);

        screen.edit("a", "phone", "2625551234").unwrap();
        screen.commit("a").await;
        let key = DocumentKey::new("associates", "a").unwrap();
        let stored = store.get(&key).await.unwrap();
        assert_eq!(stored.get("phone"), Some(&Value::from_string("(262) 555-1234")));
        let listed = screen.associates().into_iter().find(|a| a.id == "a").unwrap();
        assert_eq!(listed.phone, "(262) 555-1234");
    }

    #[tokio::test]
    async fn new_blank_associate_appears_after_reload() {
        let (_store, screen, _) = screen().await;
        let id = screen.create_blank(Utc::now()).await.unwrap();
        assert_eq!(screen.associates().len(), 4);
        assert_eq!(screen.associates()[0].id, id);
    }

    #[test]
    fn clearance_prefers_minor_then_recent_check() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut person = Associate {
            birthdate: "2012-04-02".into(),
            ..Default::default()
        };
        assert_eq!(person.clearance(now), Clearance::Minor);

        person.birthdate = "1990-01-01".into();
        assert_eq!(person.clearance(now), Clearance::NotCleared);
        person.background_check_date = Some(Timestamp::from(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(person.clearance(now), Clearance::Cleared);
        person.background_check_date = Some(Timestamp::from(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(person.clearance(now), Clearance::NotCleared);
    }

    #[test]
    fn empty_string_dates_decode_as_absent() {
        let fields = Associate::blank(Timestamp::from_millis(0)).with("backgroundCheckDate", "");
        let decoded = Associate::from_fields("x", &fields).unwrap();
        assert_eq!(decoded.background_check_date, None);
        assert_eq!(decoded.created_at, Some(Timestamp::from_millis(0)));
    }
}
