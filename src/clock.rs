//! Minute index ↔ wall-clock string conversion
//!
//! Minute indices count from the first minute seen in the input. Strings
//! use the `yyyy-MM-dd HH:mm` layout in a fixed UTC offset (UTC+08:00 by
//! default).

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Copy)]
pub struct MinuteClock {
    origin_minute: i64,
    offset: FixedOffset,
}

impl MinuteClock {
    /// Clock for a run whose minute 0 is `origin_minute` (minutes since the
    /// Unix epoch); `None` if the offset is out of range
    pub fn new(origin_minute: i64, utc_offset_minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(Self {
            origin_minute,
            offset,
        })
    }

    /// `yyyy-MM-dd HH:mm` for a minute index
    pub fn label(&self, minute: usize) -> String {
        let epoch_secs = (self.origin_minute + minute as i64) * 60;
        match DateTime::from_timestamp(epoch_secs, 0) {
            Some(utc) => utc.with_timezone(&self.offset).format(MINUTE_FORMAT).to_string(),
            None => format!("minute+{}", minute),
        }
    }

    /// Labels for minutes `0..count`, in order
    pub fn labels(&self, count: usize) -> Vec<String> {
        (0..count).map(|minute| self.label(minute)).collect()
    }

    /// Minute index of a `yyyy-MM-dd HH:mm` string
    ///
    /// `None` if the string does not parse or falls before minute 0.
    pub fn minute_of(&self, text: &str) -> Option<usize> {
        let naive = NaiveDateTime::parse_from_str(text.trim(), MINUTE_FORMAT).ok()?;
        let local = self.offset.from_local_datetime(&naive).single()?;
        let index = local.timestamp().div_euclid(60) - self.origin_minute;
        usize::try_from(index).ok()
    }
}
