// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time conversion.

use chrono::{DateTime, Utc};

/// Parse an upstream RFC3339 timestamp into UTC epoch seconds.
pub fn parse_epoch_secs(date: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp())
}

/// Local-offset hours between a UTC start and its wall-clock equivalent,
/// rounded to the nearest hour (half-hour zones round up: +5:30 is 6).
///
/// Strava reports `start_date_local` as a naive local time with a `Z`
/// suffix, so the offset is the difference of the two parsed instants.
pub fn utc_offset_hours(start_utc: &str, start_local: &str) -> Option<i8> {
    let utc = parse_epoch_secs(start_utc)?;
    let local = parse_epoch_secs(start_local)?;
    let diff = local.checked_sub(utc)?;
    i8::try_from((diff + 1800).div_euclid(3600)).ok()
}
