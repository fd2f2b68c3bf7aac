//! Mission timecodes and their ITOS string form.
//!
//! | Name   | Width   | Layout                                  | Epoch                  |
//! |--------|---------|-----------------------------------------|------------------------|
//! | Time40 | 32 bits | seconds                                 | 2000-01-01T12:00:00Z   |
//! | Time42 | 48 bits | 32 bit seconds, 16 bit 1/65536 seconds  | 2000-01-01T12:00:00Z   |
//! | Time44 | 64 bits | 32 bit seconds, 32 bit nanoseconds      | 1970-01-01T00:00:00Z   |
//!
//! The ITOS string form is `yy-DDD-HH:MM:SS.mmm`, with the milliseconds truncated.
use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::prelude::*;

/// Seconds from the Unix epoch to the Time40/Time42 epoch, 2000-01-01T12:00:00Z.
pub const EPOCH_DELTA: i64 = 946_728_000;

/// Time42 subsecond ticks per second.
pub const SUBSECONDS_PER_SECOND: u64 = 65536;

fn timestamp(secs: i64, nanos: u32, code: u64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or(Error::InvalidTimecode(code))
}

/// Coarse seconds of a Time42 value.
#[inline]
#[must_use]
pub fn time42_to_seconds(time42: u64) -> u32 {
    (time42 >> 16) as u32
}

/// Subseconds of a Time42 value, in units of 1/65536 s.
#[inline]
#[must_use]
pub fn time42_to_subseconds(time42: u64) -> u16 {
    (time42 & 0xffff) as u16
}

/// Fraction of a second represented by `subseconds`.
#[inline]
#[must_use]
pub fn subseconds_to_fraction(subseconds: f64) -> f64 {
    subseconds / SUBSECONDS_PER_SECOND as f64
}

/// Convert Time42 to UTC, at 100ns resolution.
///
/// # Errors
/// [Error::InvalidTimecode] if the result is not representable.
pub fn time42_to_datetime(time42: u64) -> Result<DateTime<Utc>> {
    let secs = i64::from(time42_to_seconds(time42)) + EPOCH_DELTA;
    let ticks = u64::from(time42_to_subseconds(time42)) * 10_000_000 / SUBSECONDS_PER_SECOND;
    timestamp(secs, (ticks * 100) as u32, time42)
}

/// Convert Time40 seconds to UTC.
///
/// # Errors
/// [Error::InvalidTimecode] if the result is not representable.
pub fn time40_to_datetime(time40: u32) -> Result<DateTime<Utc>> {
    timestamp(i64::from(time40) + EPOCH_DELTA, 0, u64::from(time40))
}

/// Convert Time44 to UTC.
///
/// The low 32 bits are nanoseconds, but are not required to be less than a second;
/// any excess carries into the seconds.
///
/// # Errors
/// [Error::InvalidTimecode] if the result is not representable.
pub fn time44_to_datetime(time44: u64) -> Result<DateTime<Utc>> {
    let nanos = time44 & 0xffff_ffff;
    let secs = (time44 >> 32) + nanos / 1_000_000_000;
    timestamp(secs as i64, (nanos % 1_000_000_000) as u32, time44)
}

/// Convert a UTC time to Time42, with subseconds at millisecond resolution.
///
/// Times before the epoch produce 0.
#[must_use]
pub fn datetime_to_time42(dt: &DateTime<Utc>) -> u64 {
    let secs = dt.timestamp() - EPOCH_DELTA;
    if secs < 0 {
        return 0;
    }
    let fine = u64::from(dt.timestamp_subsec_millis()) * SUBSECONDS_PER_SECOND / 1000;
    ((secs as u64) << 16) | fine
}

/// Format as `yy-DDD-HH:MM:SS.mmm`.
#[must_use]
pub fn to_itos(dt: &DateTime<Utc>) -> String {
    format!(
        "{}-{:03}-{}.{:03}",
        dt.format("%y"),
        dt.ordinal(),
        dt.format("%H:%M:%S"),
        dt.timestamp_subsec_millis() % 1000
    )
}

/// # Errors
/// See [time42_to_datetime].
pub fn time42_to_itos(time42: u64) -> Result<String> {
    Ok(to_itos(&time42_to_datetime(time42)?))
}

/// # Errors
/// See [time40_to_datetime].
pub fn time40_to_itos(time40: u32) -> Result<String> {
    Ok(to_itos(&time40_to_datetime(time40)?))
}

/// # Errors
/// See [time44_to_datetime].
pub fn time44_to_itos(time44: u64) -> Result<String> {
    Ok(to_itos(&time44_to_datetime(time44)?))
}
