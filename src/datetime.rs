/*!
 # Calendar date/time values

 [`CalendarDateTime`] is a broken-down local wall-clock timestamp. Its date
 and time fields may be pushed out of range by arithmetic (day 32, month 12,
 hour 25); [`CalendarDateTime::normalized`] folds them back into a real
 instant and fills in the derived weekday, year-day and DST fields.
*/

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;

use crate::zone::LocalZone;

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Daylight-saving indicator of a [`CalendarDateTime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dst {
    /// Not known, inferred from the zone on conversion
    #[default]
    Unknown,
    /// Daylight-saving time is in effect
    Yes,
    /// Standard time is in effect
    No,
}

/// Broken-down local date and time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDateTime {
    /// Absolute year (e.g. 2024)
    pub year: i32,
    /// Month, 0-based (0 = January)
    pub month: i32,
    /// Day of the month, 1-based
    pub day: i32,
    /// Hour (0-23)
    pub hour: i32,
    /// Minute (0-59)
    pub minute: i32,
    /// Second (0-59)
    pub second: i32,
    /// Day of the week (0 = Sunday), derived
    pub weekday: i32,
    /// Day of the year, 0-based, derived
    pub yearday: i32,
    /// Daylight-saving indicator
    pub dst: Dst,
}

impl CalendarDateTime {
    /// Marks an event with no future occurrence
    pub const EXPIRED: CalendarDateTime = CalendarDateTime {
        year: 1970,
        month: 0,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
        weekday: 4,
        yearday: 0,
        dst: Dst::No,
    };

    /// Creates a partially filled value from human-readable fields
    ///
    /// # Arguments
    ///
    /// * `year` - Absolute year
    /// * `month` - Month (1-12)
    /// * `day` - Day of the month (1-31)
    /// * `hour` - Hour (0-23)
    /// * `minute` - Minute (0-59)
    /// * `second` - Second (0-59)
    ///
    /// Weekday and year-day are left at zero and DST is unknown until the
    /// value is normalized.
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month: month as i32 - 1,
            day: day as i32,
            hour: hour as i32,
            minute: minute as i32,
            second: second as i32,
            weekday: 0,
            yearday: 0,
            dst: Dst::Unknown,
        }
    }

    /// Whether this is the [`CalendarDateTime::EXPIRED`] sentinel
    pub fn is_expired_sentinel(&self) -> bool {
        *self == Self::EXPIRED
    }

    /// Month as 1-12
    pub fn month_number(&self) -> i32 {
        self.month + 1
    }

    /// Wall-clock seconds since the epoch, folding out-of-range fields
    pub fn local_seconds(&self) -> i64 {
        let months = self.year as i64 * 12 + self.month as i64;
        let year = months.div_euclid(12);
        let month = months.rem_euclid(12) as u32 + 1;

        let first = i32::try_from(year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
            .unwrap_or_default();

        let days = first.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE + self.day as i64 - 1;
        days * 86_400 + self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64
    }

    /// Absolute instant (seconds since the Unix epoch) in the given zone
    pub fn to_instant(&self, zone: &LocalZone) -> i64 {
        zone.local_to_instant(self.local_seconds(), self.dst)
    }

    /// Fully populated local time for an absolute instant
    pub fn from_instant(instant: i64, zone: &LocalZone) -> Self {
        let offset = zone.offset_at(instant);
        let local = DateTime::from_timestamp(instant + offset.seconds as i64, 0)
            .unwrap_or_default()
            .naive_utc();

        let mut value = Self::from(local);
        value.dst = if offset.dst { Dst::Yes } else { Dst::No };
        value
    }

    /// Round-trips through an absolute instant with DST inference
    ///
    /// Corrects out-of-range fields and fills in weekday, year-day and DST.
    pub fn normalized(&self, zone: &LocalZone) -> Self {
        let partial = Self {
            dst: Dst::Unknown,
            ..*self
        };
        Self::from_instant(partial.to_instant(zone), zone)
    }
}

impl From<NaiveDateTime> for CalendarDateTime {
    fn from(local: NaiveDateTime) -> Self {
        Self {
            year: local.year(),
            month: local.month0() as i32,
            day: local.day() as i32,
            hour: local.hour() as i32,
            minute: local.minute() as i32,
            second: local.second() as i32,
            weekday: local.weekday().num_days_from_sunday() as i32,
            yearday: local.ordinal0() as i32,
            dst: Dst::Unknown,
        }
    }
}

impl fmt::Display for CalendarDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} {}",
            self.year,
            self.month_number(),
            self.day,
            self.hour,
            self.minute,
            self.second,
            WEEKDAYS[self.weekday.rem_euclid(7) as usize]
        )?;
        match self.dst {
            Dst::Yes => write!(f, " (DST)"),
            _ => Ok(()),
        }
    }
}

/// Source of the current wall-clock time
pub trait Clock {
    /// Seconds since the Unix epoch
    fn now(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
