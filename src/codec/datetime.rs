// codec/datetime.rs - FIPA DateTime tokens
//
//! The single textual timestamp format shared by both representations:
//! `YYYYMMDDTHHMMSSmmm`, optionally followed by a `Z` type designator.
//! Timestamps are always UTC with millisecond precision.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

/// Format a timestamp as a FIPA DateTime token, e.g. `20101223T120037000`.
pub fn format_datetime(ts: &DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}{:03}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.timestamp_subsec_millis().min(999)
    )
}

/// Parse a FIPA DateTime token. The millisecond field may be omitted.
pub fn parse_datetime(token: &str) -> Option<DateTime<Utc>> {
    let token = token
        .strip_suffix('Z')
        .or_else(|| token.strip_suffix('z'))
        .unwrap_or(token);
    let bytes = token.as_bytes();
    if !(bytes.len() == 15 || bytes.len() == 18) || !bytes[8].eq_ignore_ascii_case(&b'T') {
        return None;
    }

    let number = |range: std::ops::Range<usize>| -> Option<u32> {
        let digits = token.get(range)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    };

    let millis = if bytes.len() == 18 { number(15..18)? } else { 0 };
    from_fields(
        number(0..4)? as i32,
        number(4..6)?,
        number(6..8)?,
        number(9..11)?,
        number(11..13)?,
        number(13..15)?,
        millis,
    )
}

/// Build a UTC timestamp from calendar fields, rejecting impossible values.
pub(crate) fn from_fields(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
) -> Option<DateTime<Utc>> {
    if millis > 999 {
        return None;
    }
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(
        hour,
        minute,
        second,
        millis,
    )?;
    Some(Utc.from_utc_datetime(&naive))
}

/// The 18 decimal digits packed into a bit-efficient BinDate:
/// `YYYY MM DD hh mm ss mmmm` (milliseconds widened to four digits).
/// Messages and envelopes only hold years `0..=9999`.
pub(crate) fn bin_date_digits(ts: &DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{:04}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.timestamp_subsec_millis().min(999)
    )
}
