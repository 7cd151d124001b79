use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::store::api::{decode_snapshot, DocumentModel, FieldReader, FilterOperator, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{StoreError, StoreResult};
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::value::{MapValue, Value};
use crate::sync::{report_result, Notifier};
use crate::views::{find_today, highlight, spec_range_label, upsert_today, Threshold};

use super::document::Collection;

pub const DATE_FIELD: &str = "date";
pub const HISTORY_DAYS: i64 = 90;
const UNKNOWN_RECORDER: &str = "Unknown";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SafetySpec {
    pub id: String,
    pub name: String,
    pub units: String,
    pub lower_spec: Option<f64>,
    pub upper_spec: Option<f64>,
    pub category: Option<String>,
}

impl SafetySpec {
    pub fn evaluate(&self, value: f64) -> Threshold {
        highlight(value, self.lower_spec, self.upper_spec)
    }

    pub fn range_label(&self) -> Option<String> {
        spec_range_label(self.lower_spec, self.upper_spec)
    }
}

impl DocumentModel for SafetySpec {
    fn collection() -> &'static str {
        Collection::SafetySpecs.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            name: reader.required_string("name")?,
            units: reader.text("units")?,
            lower_spec: reader.number("lowerSpec")?,
            upper_spec: reader.number("upperSpec")?,
            category: reader.string("category")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("name", self.name.as_str())
            .with("units", self.units.as_str())
            .with_optional("lowerSpec", self.lower_spec)
            .with_optional("upperSpec", self.upper_spec)
            .with_optional("category", self.category.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub name: String,
    /// `None` when the reading was left blank.
    pub value: Option<f64>,
}

impl Measurement {
    fn from_map(reader: &FieldReader<'_>) -> StoreResult<Self> {
        // Older records stored readings as typed text.
        let value = match reader.string("value") {
            Ok(Some(text)) => text.trim().parse::<f64>().ok(),
            Ok(None) => None,
            Err(_) => reader.number("value")?,
        };
        Ok(Self {
            name: reader.text("name")?,
            value,
        })
    }

    fn to_value(&self) -> Value {
        MapValue::empty()
            .with("name", self.name.as_str())
            .with("value", self.value)
            .into()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SafetyRecord {
    pub id: String,
    pub date: Option<Timestamp>,
    pub recorded_by: String,
    pub measurements: Vec<Measurement>,
    pub safety_topic: String,
    pub notes: String,
}

impl SafetyRecord {
    pub fn measurement(&self, name: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|measurement| measurement.name == name)
            .and_then(|measurement| measurement.value)
    }
}

impl DocumentModel for SafetyRecord {
    fn collection() -> &'static str {
        Collection::SafetyRecords.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        let measurements = reader
            .maps("measurements")?
            .into_iter()
            .map(|entry| Measurement::from_map(&reader.nested("measurements", entry)))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self {
            id: id.to_string(),
            date: reader.timestamp(DATE_FIELD)?,
            recorded_by: reader.text("recordedBy")?,
            measurements,
            safety_topic: reader.text("safetyTopic")?,
            notes: reader.text("notes")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with_optional(DATE_FIELD, self.date)
            .with("recordedBy", self.recorded_by.as_str())
            .with(
                "measurements",
                Value::from_array(self.measurements.iter().map(Measurement::to_value).collect()),
            )
            .with("safetyTopic", self.safety_topic.as_str())
            .with("notes", self.notes.as_str())
    }
}

/// What the daily safety form submits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SafetyEntry {
    pub recorded_by: String,
    pub readings: BTreeMap<String, f64>,
    pub safety_topic: String,
    pub notes: String,
}

/// One point of a measurement's history.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPoint {
    pub date: Timestamp,
    pub value: Option<f64>,
}

/// The daily food safety log: specifications plus one record per day. Every store
/// failure is also reported through the notifier.
#[derive(Clone)]
pub struct SafetyLog {
    store: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
}

impl SafetyLog {
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Specifications ordered by category, then name.
    pub async fn specs(&self) -> StoreResult<Vec<SafetySpec>> {
        let result = async {
            let query = Query::new(SafetySpec::collection())?;
            let snapshot = self.store.list(&query).await?;
            let mut specs: Vec<SafetySpec> = decode_snapshot(&snapshot);
            specs.sort_by(|a, b| {
                a.category
                    .cmp(&b.category)
                    .then_with(|| a.name.cmp(&b.name))
            });
            Ok::<_, StoreError>(specs)
        }
        .await;
        report_result(self.notifier.as_ref(), result, None, "Error fetching safety items")
    }

    pub async fn today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> StoreResult<Option<SafetyRecord>> {
        let result = match find_today(self.store.as_ref(), SafetyRecord::collection(), DATE_FIELD, now).await {
            Ok(Some(snapshot)) => SafetyRecord::from_snapshot(&snapshot).map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        report_result(self.notifier.as_ref(), result, None, "Error fetching today's safety record")
    }

    /// Writes the day's record, one reading per spec; specs without a reading are
    /// stored blank. Creates the record on the day's first save.
    pub async fn save_today<Tz: TimeZone>(
        &self,
        specs: &[SafetySpec],
        entry: &SafetyEntry,
        now: &DateTime<Tz>,
    ) -> StoreResult<DocumentKey> {
        let measurements = specs
            .iter()
            .map(|spec| Measurement {
                name: spec.name.clone(),
                value: entry.readings.get(&spec.name).copied(),
            })
            .collect();
        let recorded_by = match entry.recorded_by.trim() {
            "" => UNKNOWN_RECORDER.to_string(),
            name => name.to_string(),
        };
        let record = SafetyRecord {
            id: String::new(),
            date: None,
            recorded_by,
            measurements,
            safety_topic: entry.safety_topic.clone(),
            notes: entry.notes.clone(),
        };
        let result = upsert_today(
            self.store.as_ref(),
            SafetyRecord::collection(),
            DATE_FIELD,
            now,
            record.to_fields(),
        )
        .await;
        let key = report_result(
            self.notifier.as_ref(),
            result,
            Some("Safety record saved"),
            "Error saving safety record",
        )?;
        log::debug!("saved safety record {key}");
        Ok(key)
    }

    /// Records dated within the last [`HISTORY_DAYS`], oldest first.
    pub async fn recent_records(&self, now: DateTime<Utc>) -> StoreResult<Vec<SafetyRecord>> {
        let result = self.fetch_recent(now).await;
        report_result(self.notifier.as_ref(), result, None, "Error fetching safety records")
    }

    /// History series of every measurement over the last [`HISTORY_DAYS`].
    pub async fn history(&self, now: DateTime<Utc>) -> StoreResult<BTreeMap<String, Vec<HistoryPoint>>> {
        let records = report_result(
            self.notifier.as_ref(),
            self.fetch_recent(now).await,
            None,
            "Error fetching historical data",
        )?;
        let mut series: BTreeMap<String, Vec<HistoryPoint>> = BTreeMap::new();
        for record in records {
            let Some(date) = record.date else { continue };
            for measurement in record.measurements {
                series.entry(measurement.name).or_default().push(HistoryPoint {
                    date,
                    value: measurement.value,
                });
            }
        }
        Ok(series)
    }

    async fn fetch_recent(&self, now: DateTime<Utc>) -> StoreResult<Vec<SafetyRecord>> {
        let since = Timestamp::from(now - Duration::days(HISTORY_DAYS));
        let query = Query::new(SafetyRecord::collection())?
            .where_field(DATE_FIELD, FilterOperator::GreaterThanOrEqual, since)
            .order_by_asc(DATE_FIELD);
        let snapshot = self.store.list(&query).await?;
        Ok(decode_snapshot(&snapshot))
    }
}
