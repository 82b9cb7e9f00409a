/*!
 # Configuration

 Runtime settings of the scheduler, and the events document it is loaded
 from.

 ```json
 {"tz": "America/New_York",
  "events": [
    {"d": "Feed Fish, Morning", "f": "d", "e": 65, "sd": [2024, 9, 25], "t": [8, 0, 0]},
    {"d": "Dentist", "f": "o", "sd": [2024, 10, 2], "t": [14, 30], "p": 1, "c": 16711680},
    {"d": "Water plants", "f": "w", "e": "sat,sun", "sd": [2024, 1, 3], "t": [18, 0],
     "ed": [2024, 12, 31], "s": "/files/chime.mp3", "v": "en-ca/Clara"}
  ]}
 ```

 `d` description, `f` frequency code (`o`, `d`, `w`, `m`, `y`), `e` weekday
 exclusion (number or day names), `sd` start date, `t` time of day, `ed`/`et`
 optional end date and time, `p` pattern selector, `c` color, `s` sound file,
 `v` voice.
*/

use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::datetime::CalendarDateTime;
use crate::effects::{ColorKind, Pattern};
use crate::schedule::{parse_days, Frequency};
use crate::{Error, Result};

/// Zone used until the events document names one
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Longest description kept, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 100;

/// Scheduler settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How often the store is scanned for due events
    pub poll_interval: Duration,
    /// How far past its instant an occurrence is still detected, in seconds
    pub detection_window_secs: f64,
    /// Capacity of the notification dispatch queue
    pub queue_capacity: usize,
    /// How long each due event stays on the LEDs before rotating
    pub display_interval: Duration,
    /// Whether clearing notifications also removes expired events
    pub prune_on_clear: bool,
}

impl Settings {
    /// Settings for a poll interval, with the window scaled to match
    ///
    /// Audio playback blocks for a while, so the window spans sixty polls.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            detection_window_secs: 60.0 * poll_interval.as_millis() as f64 / 1000.0,
            ..Self::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            detection_window_secs: 120.0,
            queue_capacity: 8,
            display_interval: Duration::from_millis(3000),
            prune_on_clear: true,
        }
    }
}

/// A validated event record, before it gets an id
#[derive(Debug, Clone, PartialEq)]
pub struct EventDefinition {
    pub description: String,
    pub frequency: Frequency,
    pub start: CalendarDateTime,
    pub end: Option<CalendarDateTime>,
    pub exclude: u8,
    pub pattern: Pattern,
    pub color: ColorKind,
    pub sound: String,
    pub voice: String,
}

/// Result of parsing an events document
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// IANA time-zone name from the document
    pub timezone: Option<String>,
    /// Records that passed validation, in document order
    pub definitions: Vec<EventDefinition>,
    /// Number of records that were skipped
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct EventsDocument {
    #[serde(default)]
    tz: Option<String>,
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExcludeField {
    Mask(u8),
    Names(String),
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    d: String,
    f: String,
    #[serde(default)]
    e: Option<ExcludeField>,
    sd: Vec<u32>,
    t: Vec<u32>,
    #[serde(default)]
    ed: Option<Vec<u32>>,
    #[serde(default)]
    et: Option<Vec<u32>>,
    #[serde(default)]
    p: Option<u8>,
    #[serde(default)]
    c: Option<u32>,
    #[serde(default)]
    s: Option<String>,
    #[serde(default)]
    v: Option<String>,
}

/// Parses an events document
///
/// A document that is not valid JSON is an error. Individual records that
/// are malformed are skipped and counted.
#[instrument(skip(text), fields(len = text.len()))]
pub fn parse_document(text: &str) -> Result<ParsedDocument> {
    let document: EventsDocument = serde_json::from_str(text)?;

    let mut parsed = ParsedDocument {
        timezone: document.tz,
        ..ParsedDocument::default()
    };

    for (index, value) in document.events.into_iter().enumerate() {
        match parse_record(value) {
            Ok(definition) => {
                debug!("Record {} parsed: {}", index, definition.description);
                parsed.definitions.push(definition);
            }
            Err(e) => {
                warn!("Skipping event record {}: {}", index, e);
                parsed.skipped += 1;
            }
        }
    }

    info!(
        "Parsed {} event records ({} skipped)",
        parsed.definitions.len(),
        parsed.skipped
    );
    Ok(parsed)
}

/// Reads and parses an events document from disk
pub fn load_events_file(path: impl AsRef<Path>) -> Result<ParsedDocument> {
    let path = path.as_ref();
    debug!("Loading events from {}", path.display());
    let text = std::fs::read_to_string(path)?;
    parse_document(&text)
}

fn parse_record(value: serde_json::Value) -> Result<EventDefinition> {
    let record: EventRecord =
        serde_json::from_value(value).map_err(|e| Error::InvalidRecord(e.to_string()))?;

    let mut codes = record.f.chars();
    let frequency = match (codes.next(), codes.next()) {
        (Some(code), None) => Frequency::from_code(code)?,
        _ => return Err(Error::InvalidFrequency(record.f)),
    };

    let start = date_time(&record.sd, &record.t)?;
    let end = match &record.ed {
        Some(date) => Some(date_time(date, record.et.as_deref().unwrap_or(&[0, 0, 0]))?),
        None => None,
    };

    let exclude = match record.e {
        Some(ExcludeField::Mask(mask)) => mask,
        Some(ExcludeField::Names(names)) => parse_days(&names),
        None => 0,
    };

    let pattern = Pattern::try_from(record.p.unwrap_or(0))?;
    let color = match record.c {
        Some(wire) => ColorKind::from_wire(wire)?,
        None => ColorKind::default(),
    };

    let description: String = record.d.chars().take(MAX_DESCRIPTION_CHARS).collect();

    Ok(EventDefinition {
        description,
        frequency,
        start,
        end,
        exclude,
        pattern,
        color,
        sound: record.s.unwrap_or_default(),
        voice: record.v.unwrap_or_default(),
    })
}

/// Builds a local date/time from `[y, m, d]` and `[h, m]` or `[h, m, s]`
fn date_time(date: &[u32], time: &[u32]) -> Result<CalendarDateTime> {
    let &[year, month, day] = date else {
        return Err(Error::InvalidRecord(format!(
            "date must be [year, month, day], got {date:?}"
        )));
    };
    let (hour, minute, second) = match *time {
        [hour, minute] => (hour, minute, 0),
        [hour, minute, second] => (hour, minute, second),
        _ => {
            return Err(Error::InvalidRecord(format!(
                "time must be [hour, minute] or [hour, minute, second], got {time:?}"
            )))
        }
    };

    if !(1970..=9999).contains(&year) {
        return Err(Error::ValueOutOfRange(year as i64, 1970, 9999));
    }
    if NaiveDate::from_ymd_opt(year as i32, month, day).is_none() {
        return Err(Error::InvalidRecord(format!(
            "{year:04}-{month:02}-{day:02} is not a calendar date"
        )));
    }
    if hour > 23 {
        return Err(Error::ValueOutOfRange(hour as i64, 0, 23));
    }
    if minute > 59 {
        return Err(Error::ValueOutOfRange(minute as i64, 0, 59));
    }
    if second > 59 {
        return Err(Error::ValueOutOfRange(second as i64, 0, 59));
    }

    Ok(CalendarDateTime::new(year as i32, month, day, hour, minute, second))
}
