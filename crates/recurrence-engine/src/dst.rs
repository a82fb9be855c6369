//! DST transition policies for recurring events.
//!
//! Expansion works on wall-clock times in the DTSTART zone. Most wall times map
//! to exactly one instant; the policy decides what happens to the ones that
//! fall into a spring-forward gap. Wall times repeated by a fall-back overlap
//! always resolve to the earlier instant.

use chrono::{Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Timelike};
use chrono_tz::Tz;

/// Policy for handling events that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstPolicy {
    /// Skip instances that fall in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the next valid time after the gap
    ShiftForward,
    /// Keep the wall-clock distance: read the time with the offset in effect
    /// before the transition, so 02:30 in a 02:00-03:00 gap becomes 03:30.
    #[default]
    WallClock,
}

/// Longest gap searched by [`DstPolicy::ShiftForward`]. Zones have skipped a
/// whole calendar day (Pacific/Apia, 2011-12-30).
const MAX_GAP_MINUTES: i64 = 26 * 60;

impl DstPolicy {
    /// Map a wall-clock time in `tz` to an instant, or `None` when the policy
    /// drops it.
    pub fn resolve(self, tz: &Tz, local: NaiveDateTime) -> Option<chrono::DateTime<Tz>> {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => match self {
                DstPolicy::Skip => None,
                DstPolicy::WallClock => {
                    let before = tz
                        .from_local_datetime(&(local - Duration::days(1)))
                        .earliest()?;
                    let offset = before.offset().fix();
                    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
                    Some(tz.from_utc_datetime(&utc))
                }
                DstPolicy::ShiftForward => {
                    let start = local.with_second(0)?;
                    (1..=MAX_GAP_MINUTES).find_map(|minutes| {
                        tz.from_local_datetime(&(start + Duration::minutes(minutes)))
                            .earliest()
                    })
                }
            },
        }
    }
}
