use chrono::{DateTime, TimeDelta, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Where a recurring task stands relative to its next due date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DueStatus {
    NotYetPerformed,
    DueInDays(i64),
    DueToday,
    Overdue(i64),
}

impl DueStatus {
    pub fn is_overdue(&self) -> bool {
        matches!(self, DueStatus::Overdue(_))
    }

    pub fn label(&self, interval_days: i64) -> String {
        match self {
            DueStatus::NotYetPerformed => {
                format!("Interval: {interval_days} days, not yet performed")
            }
            DueStatus::DueInDays(days) => {
                format!("Interval: {interval_days} days, due in {days} day(s)")
            }
            DueStatus::DueToday => format!("Interval: {interval_days} days, due today"),
            DueStatus::Overdue(days) => {
                format!("Interval: {interval_days} days, {days} day(s) overdue")
            }
        }
    }
}

/// Status of a task last done at `last_performed` that recurs every `interval_days`.
///
/// The distance to the next due date is rounded up to whole days from the exact
/// millisecond difference. An interval whose due date falls outside the calendar
/// range is never due and reports `DueInDays(i64::MAX)`.
pub fn due_status(
    last_performed: Option<DateTime<Utc>>,
    interval_days: i64,
    now: DateTime<Utc>,
) -> DueStatus {
    let Some(last) = last_performed else {
        return DueStatus::NotYetPerformed;
    };
    let Some(next_due) = TimeDelta::try_days(interval_days)
        .and_then(|interval| last.checked_add_signed(interval))
    else {
        log::warn!("interval of {interval_days} days from {last} is out of range");
        return DueStatus::DueInDays(i64::MAX);
    };
    let millis = (next_due - now).num_milliseconds() as f64;
    let delta = (millis / MILLIS_PER_DAY).ceil() as i64;
    match delta {
        d if d > 0 => DueStatus::DueInDays(d),
        0 => DueStatus::DueToday,
        d => DueStatus::Overdue(-d),
    }
}
