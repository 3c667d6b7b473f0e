//! Parsing of the `dd-mm-yyyy` / `HH:MM` query bounds and of continuation cursors.
//!
//! All instants are naive: no offset is attached when parsing and none is
//! assumed when comparing against stored timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

const BOUND_FORMAT: &str = "%d-%m-%Y %H:%M";
const CURSOR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeRangeError {
    #[error("invalid format: use dates as dd-mm-yyyy and times as HH:MM")]
    InvalidFormat,

    #[error("start date must not be after end date")]
    InvalidRange,
}

/// Inclusive window between two naive instants. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, TimeRangeError> {
        if start > end {
            return Err(TimeRangeError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }
}

pub fn parse_time_range(
    start_date: &str,
    start_time: &str,
    end_date: &str,
    end_time: &str,
) -> Result<TimeRange, TimeRangeError> {
    let start = parse_bound(start_date, start_time)?;
    let end = parse_bound(end_date, end_time)?;
    TimeRange::new(start, end)
}

fn parse_bound(date: &str, time: &str) -> Result<NaiveDateTime, TimeRangeError> {
    if !is_strict(date, 10, &[2, 5], b'-') || !is_strict(time, 5, &[2], b':') {
        return Err(TimeRangeError::InvalidFormat);
    }
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), BOUND_FORMAT)
        .map_err(|_| TimeRangeError::InvalidFormat)
}

// chrono tolerates unpadded fields and surrounding whitespace; the bounds are
// fixed-width so reject anything that is not digits and separators in place.
fn is_strict(value: &str, len: usize, separators: &[usize], sep: u8) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == len
        && bytes.iter().enumerate().all(|(idx, b)| {
            if separators.contains(&idx) {
                *b == sep
            } else {
                b.is_ascii_digit()
            }
        })
}

/// Parses a continuation cursor as produced by [`format_cursor`]. A bare date
/// means midnight. RFC 3339 values carrying an offset are normalised to UTC
/// before dropping the offset.
pub fn parse_cursor(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, CURSOR_FORMAT) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
}

pub fn format_cursor(value: NaiveDateTime) -> String {
    value.format(CURSOR_FORMAT).to_string()
}
