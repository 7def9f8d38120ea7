//! ISO-8601 parsing and formatting for event times.
//!
//! Event times are naive wall-clock values (no zone), stored with microsecond
//! precision. Accepted input is a four-digit year in `0001..=9999`, then
//! `YYYY-MM-DD`, optionally followed by `T` or a space and a time of `HH`,
//! `HH:MM` or `HH:MM:SS[.fff…]`, optionally followed by `Z` or an offset of
//! `±HH`, `±HHMM` or `±HH:MM`. An offset is validated and then dropped; the
//! wall-clock reading is kept as written. Surrounding whitespace is rejected.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Earliest accepted year.
const MIN_YEAR: i32 = 1;

/// Latest accepted year.
const MAX_YEAR: i32 = 9999;

/// Parses an ISO-8601 date-time into a naive wall-clock value.
///
/// Returns `None` when the input matches none of the accepted shapes.
/// Sub-microsecond digits are truncated.
#[must_use]
pub fn parse_iso_timestamp(input: &str) -> Option<NaiveDateTime> {
    let date = parse_date(input.get(..10)?)?;
    let parsed = match input.get(10..)? {
        "" => date.and_time(NaiveTime::MIN),
        rest => {
            let time = rest.strip_prefix(['T', ' '])?;
            date.and_time(parse_time(strip_offset(time)?)?)
        },
    };
    truncate_to_micros(parsed)
}

/// Formats an event time the way it is returned to clients.
///
/// Whole seconds print as `YYYY-MM-DDTHH:MM:SS`; fractional seconds add six
/// microsecond digits.
#[must_use]
pub fn format_iso_timestamp(value: &NaiveDateTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Parses exactly `YYYY-MM-DD`.
fn parse_date(date: &str) -> Option<NaiveDate> {
    let bytes = date.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year = i32::try_from(digits(date.get(..4)?)?).ok()?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, digits(date.get(5..7)?)?, digits(date.get(8..)?)?)
}

/// Parses `HH`, `HH:MM` or `HH:MM:SS` with an optional fraction.
fn parse_time(time: &str) -> Option<NaiveTime> {
    let hour = digits(time.get(..2)?)?;
    let rest = time.get(2..)?;
    if rest.is_empty() {
        return NaiveTime::from_hms_opt(hour, 0, 0);
    }

    let minute = digits(rest.strip_prefix(':')?.get(..2)?)?;
    let rest = rest.get(3..)?;
    if rest.is_empty() {
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let second = digits(rest.strip_prefix(':')?.get(..2)?)?;
    let rest = rest.get(3..)?;
    if rest.is_empty() {
        return NaiveTime::from_hms_opt(hour, minute, second);
    }

    let fraction = rest.strip_prefix('.')?;
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let micros = fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(6)
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
    NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
}

/// Removes a trailing `Z` or numeric offset, returning the local time part.
fn strip_offset(time: &str) -> Option<&str> {
    if let Some(local) = time.strip_suffix('Z') {
        return Some(local);
    }
    match time.find(['+', '-']) {
        None => Some(time),
        Some(sign) => {
            let (hours, minutes) = split_offset(time.get(sign + 1..)?)?;
            (digits(hours)? < 24 && digits(minutes)? < 60).then(|| &time[..sign])
        },
    }
}

/// Splits `HH`, `HHMM` or `HH:MM` into hours and minutes.
fn split_offset(offset: &str) -> Option<(&str, &str)> {
    match offset.len() {
        2 => Some((offset, "00")),
        4 => Some((offset.get(..2)?, offset.get(2..)?)),
        5 if offset.as_bytes()[2] == b':' => Some((offset.get(..2)?, offset.get(3..)?)),
        _ => None,
    }
}

/// Parses a non-empty run of ASCII digits.
fn digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn truncate_to_micros(value: NaiveDateTime) -> Option<NaiveDateTime> {
    let nanos = value.nanosecond();
    value.with_nanosecond(nanos - nanos % 1_000)
}
