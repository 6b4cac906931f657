use chrono::{FixedOffset, NaiveDateTime, Utc};

/// Visits shorter than this many minutes are rounded down instead of up.
pub const DEFAULT_MINUTES_THRESHOLD: u64 = 8;

const MINUTES_PER_HOUR: u64 = 60;

/// Whole minutes between `entrance` and `exit`, truncated toward zero.
///
/// Negative when `exit` precedes `entrance`; such a duration is undefined and
/// callers must not format or bill it.
pub fn duration_minutes(entrance: NaiveDateTime, exit: NaiveDateTime) -> i64 {
    (exit - entrance).num_minutes()
}

/// Renders a minute count as `H:MM`. Hours are unbounded.
pub fn format_hours_minutes(total_minutes: u64) -> String {
    format!(
        "{}:{:02}",
        total_minutes / MINUTES_PER_HOUR,
        total_minutes % MINUTES_PER_HOUR
    )
}

/// key: billing-policy -> asymmetric hour rounding
///
/// Any partial hour at or beyond `minutes_threshold` is billed in full, while
/// shorter stays round down.
pub fn billable_hours(total_minutes: u64, minutes_threshold: u64) -> u64 {
    if total_minutes >= minutes_threshold {
        total_minutes.div_ceil(MINUTES_PER_HOUR)
    } else {
        total_minutes / MINUTES_PER_HOUR
    }
}

/// Wall-clock time at the club.
pub fn club_now(offset: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&offset).naive_local()
}
