//! Local-midnight arithmetic for the daily quest reset.

use chrono::{DateTime, Days, FixedOffset, TimeZone, Utc};

/// Seconds from `now` until the next local midnight in the given UTC
/// offset.
///
/// Instances carry a fixed offset rather than a named zone, so there is
/// no DST ambiguity. Never returns zero; a reset firing exactly at
/// midnight re-arms for the following day.
pub fn seconds_until_local_midnight(offset_secs: i32, now: DateTime<Utc>) -> u64 {
    let offset = FixedOffset::east_opt(offset_secs)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local = now.with_timezone(&offset);
    let next_date = local.date_naive() + Days::new(1);
    let next_midnight = match next_date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
    {
        Some(dt) => dt.with_timezone(&Utc),
        // Unreachable for fixed offsets; fall back to a plain day.
        None => now + Days::new(1),
    };
    (next_midnight - now).num_seconds().max(1) as u64
}
