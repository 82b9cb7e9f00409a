/*!
 # Recurrence scheduling

 This module computes the next concrete occurrence of a recurring event and
 decides whether an event has run out of future occurrences. It also
 provides the weekday bitmask used to suppress firings on chosen days.
*/

use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument, trace};

use crate::datetime::{CalendarDateTime, Dst};
use crate::zone::LocalZone;
use crate::{Error, Result};

/// A leap day recurs at least once in this many years
const MAX_YEARLY_SEARCH: usize = 8;

/// Represents days of the week for exclusion masks
#[derive(Debug, Clone, Copy)]
pub struct Days {
    /// Sunday (0x01)
    pub sunday: u8,
    /// Monday (0x02)
    pub monday: u8,
    /// Tuesday (0x04)
    pub tuesday: u8,
    /// Wednesday (0x08)
    pub wednesday: u8,
    /// Thursday (0x10)
    pub thursday: u8,
    /// Friday (0x20)
    pub friday: u8,
    /// Saturday (0x40)
    pub saturday: u8,
    /// All days (0x7F)
    pub all: u8,
    /// Week days (Monday-Friday, 0x3E)
    pub week_days: u8,
    /// Weekend days (Saturday-Sunday, 0x41)
    pub weekend_days: u8,
    /// No days (0x00)
    pub none: u8,
}

/// Predefined day constants, bit `w` set for weekday `w` (0 = Sunday)
pub const WEEK_DAYS: Days = Days {
    sunday: 0x01,
    monday: 0x02,
    tuesday: 0x04,
    wednesday: 0x08,
    thursday: 0x10,
    friday: 0x20,
    saturday: 0x40,
    all: 0x01 + 0x02 + 0x04 + 0x08 + 0x10 + 0x20 + 0x40,
    week_days: 0x02 + 0x04 + 0x08 + 0x10 + 0x20,
    weekend_days: 0x01 + 0x40,
    none: 0x00,
};

/// Parse a days string (`"sat,sun"`, `"weekend"`, ...) to a bitmask
///
/// Unknown names contribute nothing to the mask.
pub fn parse_days(days: &str) -> u8 {
    let result = match days.trim().to_lowercase().as_str() {
        "sun" | "sunday" => WEEK_DAYS.sunday,
        "mon" | "monday" => WEEK_DAYS.monday,
        "tue" | "tuesday" => WEEK_DAYS.tuesday,
        "wed" | "wednesday" => WEEK_DAYS.wednesday,
        "thu" | "thursday" => WEEK_DAYS.thursday,
        "fri" | "friday" => WEEK_DAYS.friday,
        "sat" | "saturday" => WEEK_DAYS.saturday,
        "all" => WEEK_DAYS.all,
        "weekdays" => WEEK_DAYS.week_days,
        "weekend" => WEEK_DAYS.weekend_days,
        "" | "none" => WEEK_DAYS.none,
        composite if composite.contains(',') => composite
            .split(',')
            .map(parse_days)
            .fold(WEEK_DAYS.none, |acc, day| acc | day),
        other => {
            debug!("Ignoring unknown day name: {}", other);
            WEEK_DAYS.none
        }
    };

    trace!("Days '{}' parsed to bitmask: {:#04x}", days, result);
    result
}

/// Whether `mask` suppresses firing on `weekday` (0 = Sunday)
pub fn is_excluded(mask: u8, weekday: i32) -> bool {
    (0..7).contains(&weekday) && mask & (1 << weekday) != 0
}

/// How often an event recurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Fires a single time
    Once,
    /// Every day at the same time
    Daily,
    /// Every week on the same weekday
    Weekly,
    /// Every month on the same day of the month
    Monthly,
    /// Every year on the same month and day
    Yearly,
}

impl Frequency {
    /// Parses a single-character frequency code (`o`, `d`, `w`, `m`, `y`)
    pub fn from_code(code: char) -> Result<Self> {
        match code.to_ascii_lowercase() {
            'o' => Ok(Frequency::Once),
            'd' => Ok(Frequency::Daily),
            'w' => Ok(Frequency::Weekly),
            'm' => Ok(Frequency::Monthly),
            'y' => Ok(Frequency::Yearly),
            other => Err(Error::InvalidFrequency(other.to_string())),
        }
    }

    /// The single-character code of this frequency
    pub fn code(&self) -> char {
        match self {
            Frequency::Once => 'o',
            Frequency::Daily => 'd',
            Frequency::Weekly => 'w',
            Frequency::Monthly => 'm',
            Frequency::Yearly => 'y',
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::from_code(code),
            _ => match s.trim().to_lowercase().as_str() {
                "once" => Ok(Frequency::Once),
                "daily" => Ok(Frequency::Daily),
                "weekly" => Ok(Frequency::Weekly),
                "monthly" => Ok(Frequency::Monthly),
                "yearly" => Ok(Frequency::Yearly),
                _ => Err(Error::InvalidFrequency(s.to_string())),
            },
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Once => write!(f, "once"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Yearly => write!(f, "yearly"),
        }
    }
}

/// Computes the next occurrence of an event strictly after `now`
///
/// An occurrence still in the future is returned as is (normalized). A past
/// or due occurrence is rolled forward according to `frequency`; one-shot
/// events and arithmetic that fails to reach the future yield
/// [`CalendarDateTime::EXPIRED`].
///
/// # Arguments
///
/// * `scheduled_at` - Last scheduled occurrence
/// * `frequency` - Recurrence of the event
/// * `now` - Current local time
/// * `zone` - Local time zone
#[instrument(
    level = "trace",
    skip_all,
    fields(scheduled_at = %scheduled_at, frequency = %frequency, now = %now)
)]
pub fn advance(
    scheduled_at: &CalendarDateTime,
    frequency: Frequency,
    now: &CalendarDateTime,
    zone: &LocalZone,
) -> CalendarDateTime {
    let requested = *scheduled_at;
    let original = requested.normalized(zone);

    let t_now = now.to_instant(zone);
    let t_scheduled = original.to_instant(zone);
    if t_scheduled > t_now {
        return original;
    }

    let local_now = CalendarDateTime::from_instant(t_now, zone);
    // Date of today, time of day as requested
    let mut next = CalendarDateTime {
        hour: requested.hour,
        minute: requested.minute,
        second: requested.second,
        dst: Dst::Unknown,
        ..local_now
    };

    match frequency {
        Frequency::Once => {
            debug!("One-shot occurrence {} has passed", requested);
            return CalendarDateTime::EXPIRED;
        }
        Frequency::Daily => {
            if next.to_instant(zone) <= t_now {
                next.day += 1;
            }
        }
        Frequency::Weekly => {
            let ahead = if next.to_instant(zone) <= t_now {
                1 + (original.weekday - 1 + 7 - local_now.weekday).rem_euclid(7)
            } else {
                (original.weekday + 7 - local_now.weekday).rem_euclid(7)
            };
            next.day += ahead;
        }
        Frequency::Monthly => {
            next.day = requested.day;
            if next.to_instant(zone) <= t_now {
                next.month += 1;
            }
            next = CalendarDateTime::from_instant(next.to_instant(zone), zone);
            // Day 29-31 may have spilled into the following month
            if next.day != requested.day {
                trace!("Forcing day of month back to {}", requested.day);
                next.day = requested.day;
            }
            next.dst = Dst::Unknown;
        }
        Frequency::Yearly => {
            next.month = requested.month;
            next.day = requested.day;
            let candidate = next.normalized(zone);
            let drifted = candidate.day != requested.day && candidate.month != requested.month;
            if drifted || next.to_instant(zone) <= t_now {
                match next_yearly(&next, &requested, zone) {
                    Some(found) => next = found,
                    None => {
                        debug!("No yearly occurrence found for {}", requested);
                        return CalendarDateTime::EXPIRED;
                    }
                }
            }
        }
    }

    let t_next = next.to_instant(zone);
    let mut next = CalendarDateTime::from_instant(t_next, zone);

    if t_next <= t_now {
        debug!("Occurrence {} did not move past now, expiring", next);
        return CalendarDateTime::EXPIRED;
    }

    // Date arithmetic across a DST boundary may have moved the hour
    if next.hour != requested.hour {
        trace!("Restoring hour {} (was {})", requested.hour, next.hour);
        next.hour = requested.hour;
        next.dst = Dst::Unknown;
    }

    trace!("Next occurrence: {}", next);
    next
}

/// Steps the year forward until the month or the day lands where requested
///
/// Moves a February 29 event to the next leap year instead of letting it
/// slide to March 1.
fn next_yearly(
    next: &CalendarDateTime,
    requested: &CalendarDateTime,
    zone: &LocalZone,
) -> Option<CalendarDateTime> {
    let mut year = next.year;
    for _ in 0..MAX_YEARLY_SEARCH {
        year += 1;
        let candidate = CalendarDateTime { year, ..*next }.normalized(zone);
        if !(candidate.day != requested.day && candidate.month != requested.month) {
            return Some(candidate);
        }
        trace!("Year {} has no {}-{}", year, requested.month_number(), requested.day);
    }
    None
}

/// Whether an event has no future occurrence left
///
/// True when `scheduled_at` is not after `now`, or when it is at or past
/// `end_at`.
pub fn is_expired(
    scheduled_at: &CalendarDateTime,
    end_at: Option<&CalendarDateTime>,
    now: &CalendarDateTime,
    zone: &LocalZone,
) -> bool {
    let t_scheduled = scheduled_at.to_instant(zone);
    if t_scheduled <= now.to_instant(zone) {
        return true;
    }
    end_at.is_some_and(|end| t_scheduled >= end.to_instant(zone))
}
