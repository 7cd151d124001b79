use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::api::{DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{validation, StoreResult};
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::value::{MapValue, Value};
use crate::sync::{report_result, FieldSchema, Notifier, SyncSettings, SynchronizedList};
use crate::views::{due_status, DueStatus};

use super::document::Collection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
    Text,
    /// `text` holds an image URL.
    Image,
}

/// One step of a task or recipe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub text: String,
}

impl Instruction {
    /// Reads the `instructions` array; entries are plain strings or `{type, text}` maps.
    pub(crate) fn read_all(reader: &FieldReader<'_>, fields: &MapValue) -> StoreResult<Vec<Self>> {
        let Some(items) = fields.get("instructions").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        items
            .iter()
            .map(|item| match (item.as_str(), item.as_map()) {
                (Some(text), _) => Ok(Instruction {
                    kind: InstructionKind::Text,
                    text: text.to_string(),
                }),
                (None, Some(map)) => {
                    let entry = reader.nested("instructions", map);
                    let kind = match entry.string("type")?.as_deref() {
                        Some("image") => InstructionKind::Image,
                        _ => InstructionKind::Text,
                    };
                    Ok(Instruction {
                        kind,
                        text: entry.text("text")?,
                    })
                }
                (None, None) => Err(validation(format!(
                    "instruction must be text or a map, found {}",
                    item.type_name()
                ))),
            })
            .collect()
    }

    pub(crate) fn to_value(&self) -> Value {
        let kind = match self.kind {
            InstructionKind::Text => "text",
            InstructionKind::Image => "image",
        };
        MapValue::empty()
            .with("type", kind)
            .with("text", self.text.as_str())
            .into()
    }
}

/// One performance of a maintenance task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub by: String,
    pub date: Timestamp,
    pub notes: String,
}

impl Completion {
    fn to_value(&self) -> Value {
        MapValue::empty()
            .with("by", self.by.as_str())
            .with("date", self.date)
            .with("notes", self.notes.as_str())
            .into()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceTask {
    pub id: String,
    pub name: String,
    pub interval_days: i64,
    pub instructions: Vec<Instruction>,
    pub completed: Vec<Completion>,
}

impl MaintenanceTask {
    /// Date of the most recent completion.
    pub fn last_performed(&self) -> Option<DateTime<Utc>> {
        self.completed
            .iter()
            .map(|completion| completion.date)
            .max()
            .map(|date| date.to_datetime())
    }

    pub fn status(&self, now: DateTime<Utc>) -> DueStatus {
        due_status(self.last_performed(), self.interval_days, now)
    }
}

impl DocumentModel for MaintenanceTask {
    fn collection() -> &'static str {
        Collection::Maintenance.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        let instructions = Instruction::read_all(&reader, fields)?;

        let completed = reader
            .maps("completed")?
            .into_iter()
            .filter_map(|entry| {
                let entry = reader.nested("completed", entry);
                // Entries without a date cannot be placed in the history.
                let date = entry.timestamp("date").ok().flatten()?;
                Some(Completion {
                    by: entry.text("by").unwrap_or_default(),
                    date,
                    notes: entry.text("notes").unwrap_or_default(),
                })
            })
            .collect();

        Ok(Self {
            id: id.to_string(),
            name: reader.text("name")?,
            interval_days: reader.integer("intervalDays")?.unwrap_or(0),
            instructions,
            completed,
        })
    }

    fn to_fields(&self) -> MapValue {
        let instructions = self.instructions.iter().map(Instruction::to_value).collect();
        MapValue::empty()
            .with("name", self.name.as_str())
            .with("intervalDays", self.interval_days)
            .with("instructions", Value::from_array(instructions))
            .with(
                "completed",
                Value::from_array(self.completed.iter().map(Completion::to_value).collect()),
            )
    }
}

pub fn maintenance_query() -> StoreResult<Query> {
    Ok(Query::new(MaintenanceTask::collection())?.order_by_asc("name"))
}

/// Recurring maintenance tasks with their due status. Loaded once, not live.
pub struct MaintenanceScreen {
    list: SynchronizedList,
}

impl MaintenanceScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                MaintenanceTask::collection(),
                FieldSchema::new(),
                settings,
                notifier,
            ),
        }
    }

    pub async fn load(&self) -> StoreResult<()> {
        self.list.load_once(maintenance_query()?).await
    }

    pub fn tasks(&self) -> Vec<MaintenanceTask> {
        self.list.view().decode()
    }

    pub fn statuses(&self, now: DateTime<Utc>) -> Vec<(MaintenanceTask, DueStatus)> {
        self.tasks()
            .into_iter()
            .map(|task| {
                let status = task.status(now);
                (task, status)
            })
            .collect()
    }

    /// Appends a completion to the task's history and reloads the list.
    pub async fn record_completion(
        &self,
        task_id: &str,
        by: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = self.append_completion(task_id, by, notes, now).await;
        report_result(
            self.list.notifier().as_ref(),
            result,
            Some("Completion added successfully"),
            "Error adding completion",
        )?;
        self.list.refresh().await
    }

    async fn append_completion(
        &self,
        task_id: &str,
        by: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let store = self.list.store();
        let key = DocumentKey::new(MaintenanceTask::collection(), task_id)?;
        let task = MaintenanceTask::from_snapshot(&store.get(&key).await?)?;

        let mut completed: Vec<Value> = task.completed.iter().map(Completion::to_value).collect();
        completed.push(
            Completion {
                by: by.to_string(),
                date: Timestamp::from(now),
                notes: notes.to_string(),
            }
            .to_value(),
        );
        store
            .update(&key, MapValue::empty().with("completed", Value::from_array(completed)))
            .await
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::store::datastore::InMemoryStore;
    use crate::sync::NotificationQueue;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn recording_a_completion_resets_the_due_date() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let task = MaintenanceTask {
            id: "grinder".into(),
            name: "Clean grinder".into(),
            interval_days: 7,
            instructions: vec![Instruction {
                kind: InstructionKind::Text,
                text: "Empty hopper".into(),
            }],
            completed: vec![Completion {
                by: "Li".into(),
                date: Timestamp::from(now - Duration::days(10)),
                notes: String::new(),
            }],
        };
        let key = DocumentKey::new("maintenance", "grinder").unwrap();
        store.set(&key, task.to_fields()).await.unwrap();

        let screen = MaintenanceScreen::new(
            store.clone(),
            SyncSettings::default(),
            Arc::new(NotificationQueue::new()),
        );
        screen.load().await.unwrap();
        assert_eq!(screen.statuses(now)[0].1, DueStatus::Overdue(3));

        screen.record_completion("grinder", "Dana", "done", now).await.unwrap();
        let tasks = screen.tasks();
        assert_eq!(tasks[0].completed.len(), 2);
        assert_eq!(tasks[0].status(now), DueStatus::DueInDays(7));
    }

    #[tokio::test]
    async fn completion_on_a_missing_task_is_notified() {
        let store = Arc::new(InMemoryStore::new());
        let notifications = NotificationQueue::new();
        let screen = MaintenanceScreen::new(
            store,
            SyncSettings::default(),
            Arc::new(notifications.clone()),
        );
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        assert!(screen.record_completion("gone", "Dana", "", now).await.is_err());
        assert_eq!(
            notifications.drain(),
            vec![crate::sync::Notification::error("Error adding completion")]
        );
    }

    #[test]
    fn reads_plain_string_instructions() {
        let fields = MapValue::empty()
            .with("name", "Descale")
            .with("intervalDays", 30i64)
            .with("instructions", Value::from_strings(["Drain boiler"]));
        let task = MaintenanceTask::from_fields("descale", &fields).unwrap();
        assert_eq!(task.instructions[0].text, "Drain boiler");
        assert!(task.last_performed().is_none());
    }

    #[test]
    fn oversized_interval_is_reported_not_fatal() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let fields = MapValue::empty()
            .with("name", "Replace boiler")
            .with("intervalDays", 1_000_000_000i64)
            .with(
                "completed",
                Value::from_array(vec![MapValue::empty()
                    .with("by", "Li")
                    .with("date", Timestamp::from(now))
                    .into()]),
            );
        let task = MaintenanceTask::from_fields("boiler", &fields).unwrap();
        assert_eq!(task.status(now), DueStatus::DueInDays(i64::MAX));
    }
}
