//! Time-label parsing and fire-time arithmetic.

use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use regex::Regex;

use crate::error::SchedulerError;

static TIME_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:at\s+)?(\d{1,2}):(\d{2})$").expect("time label pattern is valid")
});

/// Parse `"At 18:00"` / `"at 9:30"` / `"18:00"` into a time of day.
pub fn parse_time_of_day(label: &str) -> Result<NaiveTime, SchedulerError> {
    let invalid = || SchedulerError::InvalidTime {
        label: label.to_string(),
    };

    let caps = TIME_LABEL.captures(label.trim()).ok_or_else(invalid)?;
    let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = caps[2].parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// The first occurrence of `target` at or after `now`: today if still ahead,
/// otherwise tomorrow.
pub fn next_occurrence(now: NaiveDateTime, target: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(target);
    if today < now {
        today + TimeDelta::days(1)
    } else {
        today
    }
}

/// Wait until `at`, clamped to zero for overdue fire times.
///
/// Both times are local wall-clock readings. They are resolved through the
/// system time zone, so a wait that spans a DST change is an hour shorter or
/// longer than the naive difference. Repeats after the first delivery keep a
/// fixed 24 h gap and drift by that hour across the change.
pub fn delay_until(now: NaiveDateTime, at: NaiveDateTime) -> std::time::Duration {
    delay_in(&Local, now, at)
}

/// [`delay_until`] in an explicit zone. A time that falls in a DST gap
/// has no instant; the naive difference is used then.
fn delay_in<Tz: TimeZone>(tz: &Tz, now: NaiveDateTime, at: NaiveDateTime) -> std::time::Duration {
    let resolved = tz
        .from_local_datetime(&now)
        .earliest()
        .zip(tz.from_local_datetime(&at).earliest());
    let elapsed = match resolved {
        Some((now, at)) => at.signed_duration_since(now),
        None => at - now,
    };
    elapsed.to_std().unwrap_or_default()
}
