//! Minute-of-day addressing. All partitioning happens on the UTC calendar.

use time::{Date, Duration, OffsetDateTime, UtcOffset};

pub const MINUTES_PER_DAY: u16 = 1440;

pub fn utc_day(ts: OffsetDateTime) -> Date {
    ts.to_offset(UtcOffset::UTC).date()
}

pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Minute within the UTC day, in `0..1440`.
pub fn minute_of_day(ts: OffsetDateTime) -> u16 {
    let utc = ts.to_offset(UtcOffset::UTC);
    u16::from(utc.hour()) * 60 + u16::from(utc.minute())
}

pub fn timestamp_for_minute(day: Date, minute: u16) -> OffsetDateTime {
    day.midnight().assume_utc() + Duration::minutes(i64::from(minute))
}
