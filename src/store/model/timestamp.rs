use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Store-side point in time with nanosecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        let mut timestamp = Self { seconds, nanos };
        timestamp.normalize();
        timestamp
    }

    /// Current wall-clock time. Uses the JS clock on wasm32.
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn from_datetime<Tz: TimeZone>(value: &DateTime<Tz>) -> Self {
        let utc = value.with_timezone(&Utc);
        Self::new(utc.timestamp(), utc.timestamp_subsec_nanos() as i32)
    }

    /// Converts to a UTC date-time. Out-of-range values clamp to the Unix epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds, self.nanos as u32).unwrap_or_default()
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(
            millis.div_euclid(1_000),
            (millis.rem_euclid(1_000) * 1_000_000) as i32,
        )
    }

    pub fn to_millis(&self) -> i64 {
        self.seconds * 1_000 + i64::from(self.nanos) / 1_000_000
    }

    /// The smallest timestamp strictly after `self`.
    pub fn successor(&self) -> Self {
        Self::new(self.seconds, self.nanos + 1)
    }

    fn normalize(&mut self) {
        let total = i64::from(self.nanos);
        self.seconds += total.div_euclid(NANOS_PER_SECOND);
        self.nanos = total.rem_euclid(NANOS_PER_SECOND) as i32;
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.seconds.cmp(&other.seconds) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            ordering => ordering,
        }
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(value: DateTime<Tz>) -> Self {
        Self::from_datetime(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nanos_overflow() {
        let ts = Timestamp::new(1, 1_500_000_000);
        assert_eq!(ts, Timestamp::new(2, 500_000_000));
        let negative = Timestamp::new(1, -1);
        assert_eq!(negative, Timestamp::new(0, 999_999_999));
    }

    #[test]
    fn successor_is_strictly_greater() {
        let ts = Timestamp::new(10, 999_999_999);
        assert!(ts.successor() > ts);
        assert_eq!(ts.successor(), Timestamp::new(11, 0));
    }

    #[test]
    fn round_trips_through_chrono() {
        let when = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap();
        let ts = Timestamp::from(when);
        assert_eq!(ts.to_datetime(), when);
        assert_eq!(Timestamp::from_millis(ts.to_millis()), ts);
    }
}
