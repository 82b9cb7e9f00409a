/*!
 # Local time zone

 The device runs in one IANA time zone such as `America/New_York`. The zone
 rules come from [`chrono_tz`]; this module only converts between absolute
 instants (seconds since the Unix epoch) and local wall-clock seconds, and
 decides how a [`Dst`] hint picks between the readings of a local time that
 the zone maps to zero or two instants.
*/

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::datetime::Dst;
use crate::{Error, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// UTC offset in effect at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneOffset {
    /// Seconds east of UTC
    pub seconds: i32,
    /// Whether daylight-saving time is in effect
    pub dst: bool,
}

/// The device's time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalZone {
    tz: Tz,
}

impl LocalZone {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Coordinated Universal Time
    pub fn utc() -> Self {
        Self::new(Tz::UTC)
    }

    /// IANA name of the zone
    pub fn as_str(&self) -> &'static str {
        self.tz.name()
    }

    /// Returns the offset in effect at the given instant
    pub fn offset_at(&self, instant: i64) -> ZoneOffset {
        let utc = DateTime::from_timestamp(instant, 0).unwrap_or_default().naive_utc();
        let offset = self.tz.offset_from_utc_datetime(&utc);
        ZoneOffset {
            seconds: offset.fix().local_minus_utc(),
            dst: offset.dst_offset().num_seconds() != 0,
        }
    }

    /// Converts local wall-clock seconds to an absolute instant
    ///
    /// Times the zone maps to a single instant ignore the hint. For a time
    /// repeated by a backward transition, `Yes`/`No` pick the daylight or
    /// standard reading and `Unknown` takes the earlier instant. Times
    /// skipped by a forward transition are read with the offset in effect
    /// before it, so 02:30 on the spring-forward day lands on 03:30 daylight
    /// time.
    pub fn local_to_instant(&self, local: i64, hint: Dst) -> i64 {
        let naive = naive_from_seconds(local);
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(at) => at.timestamp(),
            LocalResult::Ambiguous(first, second) => {
                let (earlier, later) = if first <= second {
                    (first, second)
                } else {
                    (second, first)
                };
                let wanted = match hint {
                    Dst::Unknown => return earlier.timestamp(),
                    Dst::Yes => true,
                    Dst::No => false,
                };
                trace!("Local time {} is ambiguous, hint {:?}", naive, hint);
                [earlier, later]
                    .into_iter()
                    .find(|at| (at.offset().dst_offset().num_seconds() != 0) == wanted)
                    .unwrap_or(earlier)
                    .timestamp()
            }
            LocalResult::None => {
                let before = self.offset_at(local - SECONDS_PER_DAY);
                trace!(
                    "Local time {} falls in a transition gap, using offset {}",
                    naive,
                    before.seconds
                );
                local - before.seconds as i64
            }
        }
    }
}

fn naive_from_seconds(local: i64) -> NaiveDateTime {
    DateTime::from_timestamp(local, 0).unwrap_or_default().naive_utc()
}

impl Default for LocalZone {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        name.parse::<Tz>()
            .map(Self::new)
            .map_err(|e| Error::InvalidTimeZone(name.to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
    }

    // Wall-clock seconds share the epoch arithmetic of UTC
    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        utc(y, mo, d, h, mi, s)
    }

    fn eastern() -> LocalZone {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn offsets_follow_the_season() {
        let tz = eastern();
        assert_eq!(tz.as_str(), "America/New_York");
        assert_eq!(tz.to_string(), "America/New_York");

        let winter = tz.offset_at(utc(2024, 1, 15, 12, 0, 0));
        assert_eq!(winter, ZoneOffset { seconds: -5 * 3600, dst: false });

        let summer = tz.offset_at(utc(2024, 7, 15, 12, 0, 0));
        assert_eq!(summer, ZoneOffset { seconds: -4 * 3600, dst: true });
    }

    #[test]
    fn transitions_happen_at_two_local() {
        let tz = eastern();
        // 2024-03-10 02:00 EST == 07:00 UTC
        assert!(!tz.offset_at(utc(2024, 3, 10, 6, 59, 59)).dst);
        assert!(tz.offset_at(utc(2024, 3, 10, 7, 0, 0)).dst);
        // 2024-11-03 02:00 EDT == 06:00 UTC
        assert!(tz.offset_at(utc(2024, 11, 3, 5, 59, 59)).dst);
        assert!(!tz.offset_at(utc(2024, 11, 3, 6, 0, 0)).dst);
    }

    #[test]
    fn gap_moves_forward_and_overlap_takes_earlier() {
        let tz = eastern();
        let gap = tz.local_to_instant(local(2024, 3, 10, 2, 30, 0), Dst::Unknown);
        assert_eq!(gap, utc(2024, 3, 10, 7, 30, 0)); // 03:30 EDT

        let overlap = tz.local_to_instant(local(2024, 11, 3, 1, 30, 0), Dst::Unknown);
        assert_eq!(overlap, utc(2024, 11, 3, 5, 30, 0)); // first 01:30, EDT
    }

    #[test]
    fn hint_picks_reading_of_repeated_hour() {
        let tz = eastern();
        let repeated = local(2024, 11, 3, 1, 30, 0);
        assert_eq!(tz.local_to_instant(repeated, Dst::Yes), utc(2024, 11, 3, 5, 30, 0));
        assert_eq!(tz.local_to_instant(repeated, Dst::No), utc(2024, 11, 3, 6, 30, 0));

        // Unambiguous times ignore a stale hint
        let noon = local(2024, 7, 4, 12, 0, 0);
        assert_eq!(tz.local_to_instant(noon, Dst::No), utc(2024, 7, 4, 16, 0, 0));
    }

    #[test]
    fn southern_hemisphere_summer_spans_new_year() {
        let tz: LocalZone = "Australia/Sydney".parse().unwrap();
        assert!(tz.offset_at(utc(2024, 1, 10, 0, 0, 0)).dst);
        assert!(!tz.offset_at(utc(2024, 6, 10, 0, 0, 0)).dst);
        assert_eq!(tz.offset_at(utc(2024, 12, 25, 0, 0, 0)).seconds, 11 * 3600);
    }

    #[test]
    fn utc_is_fixed() {
        let tz = LocalZone::utc();
        assert_eq!(tz, LocalZone::default());
        assert_eq!("UTC".parse::<LocalZone>().unwrap(), tz);
        assert_eq!(tz.offset_at(0), ZoneOffset { seconds: 0, dst: false });
        assert_eq!(tz.local_to_instant(1_000, Dst::Yes), 1_000);
    }

    #[test]
    fn rejects_unknown_names() {
        for bad in ["", "Mars/Olympus_Mons", "EST5EDT,M3.2.0,M11.1.0", "America/"] {
            assert!(
                matches!(bad.parse::<LocalZone>(), Err(Error::InvalidTimeZone(..))),
                "{bad:?} should be rejected"
            );
        }
    }
}
