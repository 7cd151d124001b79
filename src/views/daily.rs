//! Collections holding at most one document per calendar day, such as the safety log.
//!
//! The invariant is upheld by looking the day's document up before creating one. Two
//! clients writing the first record of a day at the same moment can still both create
//! one; callers must tolerate that.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use crate::store::api::{DocumentSnapshot, FilterOperator, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{invalid_argument, StoreResult};
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::value::{MapValue, Value};

/// Half-open `[start, end)` bounds of the calendar day containing `now`, in `now`'s
/// time zone, converted to UTC.
pub fn day_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> StoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let zone = now.timezone();
    let today = now.date_naive();
    let tomorrow = today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| invalid_argument("date out of range"))?;
    Ok((start_of(&zone, today)?, start_of(&zone, tomorrow)?))
}

fn start_of<Tz: TimeZone>(zone: &Tz, date: NaiveDate) -> StoreResult<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| invalid_argument("invalid midnight"))?;
    // A midnight skipped by a DST jump starts the day at the first instant that exists.
    let local = zone
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| zone.from_utc_datetime(&midnight));
    Ok(local.with_timezone(&Utc))
}

fn day_query<Tz: TimeZone>(collection: &str, date_field: &str, now: &DateTime<Tz>) -> StoreResult<Query> {
    let (start, end) = day_bounds(now)?;
    Ok(Query::new(collection)?
        .where_field(date_field, FilterOperator::GreaterThanOrEqual, Timestamp::from(start))
        .where_field(date_field, FilterOperator::LessThan, Timestamp::from(end))
        .order_by_asc(date_field)
        .with_limit(1))
}

/// The document dated within today, if any.
pub async fn find_today<Tz: TimeZone>(
    store: &dyn RemoteStore,
    collection: &str,
    date_field: &str,
    now: &DateTime<Tz>,
) -> StoreResult<Option<DocumentSnapshot>> {
    let query = day_query(collection, date_field, now)?;
    let snapshot = store.list(&query).await?;
    Ok(snapshot.into_documents().into_iter().next())
}

/// Today's document, created from `initial` (stamped with `now`) when none exists.
pub async fn get_or_create_today<Tz: TimeZone>(
    store: &dyn RemoteStore,
    collection: &str,
    date_field: &str,
    now: &DateTime<Tz>,
    initial: MapValue,
) -> StoreResult<DocumentSnapshot> {
    if let Some(existing) = find_today(store, collection, date_field, now).await? {
        return Ok(existing);
    }
    let data = initial.with(date_field, Value::from_timestamp(Timestamp::from_datetime(now)));
    let key = store.add(collection, data).await?;
    log::debug!("created daily record {key}");
    store.get(&key).await
}

/// Writes `fields` into today's document, creating it when none exists yet.
pub async fn upsert_today<Tz: TimeZone>(
    store: &dyn RemoteStore,
    collection: &str,
    date_field: &str,
    now: &DateTime<Tz>,
    fields: MapValue,
) -> StoreResult<DocumentKey> {
    match find_today(store, collection, date_field, now).await? {
        Some(existing) => {
            let key = existing.key().clone();
            store.update(&key, fields).await?;
            Ok(key)
        }
        None => {
            let data = fields.with(date_field, Value::from_timestamp(Timestamp::from_datetime(now)));
            store.add(collection, data).await
        }
    }
}
