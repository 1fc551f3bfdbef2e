//! Wall-clock timestamp formatting.
//!
//! Flight logs carry ISO 8601 timestamps and log files are named after the
//! session start time. Both are formatted by hand from the Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Days-to-civil-date conversion for the proleptic Gregorian calendar.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

fn split(t: SystemTime) -> (i64, u32, u32, u64, u64, u64, u32) {
    let since_epoch = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let sod = secs % 86_400;
    (
        year,
        month,
        day,
        sod / 3600,
        (sod % 3600) / 60,
        sod % 60,
        since_epoch.subsec_millis(),
    )
}

/// Format a timestamp as ISO 8601 UTC with millisecond precision,
/// e.g. `2026-08-06T14:03:27.512Z`.
pub fn format_iso8601(t: SystemTime) -> String {
    let (year, month, day, hour, min, sec, millis) = split(t);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year, month, day, hour, min, sec, millis
    )
}

/// Format a timestamp as a compact filename stamp, e.g. `20260806_140327`.
pub fn filename_stamp(t: SystemTime) -> String {
    let (year, month, day, hour, min, sec, _) = split(t);
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        year, month, day, hour, min, sec
    )
}
