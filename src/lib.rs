/*!
 # Smart Button Scheduling Core

 A Rust library for the firmware core of a networked "smart button"
 notification device. It keeps a small set of recurring calendar events,
 detects when each one is due and hands notification requests to the
 visual and aural subsystems.

 ## Features

 * IANA time zones via `chrono-tz`, with daylight-saving inference
 * Once, daily, weekly, monthly and yearly recurrence
 * Weekday exclusion masks
 * Expiry by end date
 * Bounded, non-blocking notification dispatch queue
 * Short/long button interactions (replay, clear)

 ## Example

 ```rust
 use smart_button::*;

 fn main() -> Result<()> {
     let zone: LocalZone = "America/New_York".parse()?;

     // Saturday 2024-09-28, 07:59:00 local time
     let now = CalendarDateTime::new(2024, 9, 28, 7, 59, 0).normalized(&zone);
     let start = CalendarDateTime::new(2024, 9, 25, 8, 0, 0);

     let next = advance(&start, Frequency::Daily, &now, &zone);
     assert_eq!((next.day, next.hour), (28, 8));
     assert_eq!(next.weekday, 6);

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the smart button scheduling core
#[derive(Error, Debug)]
pub enum Error {
    /// The time-zone name is not a known IANA zone
    #[error("Invalid time zone {0:?}: {1}")]
    InvalidTimeZone(String, String),

    /// Unknown frequency code in an event definition
    #[error("Unknown frequency code {0:?}")]
    InvalidFrequency(String),

    /// An event record in the configuration document is malformed
    #[error("Malformed event record: {0}")]
    InvalidRecord(String),

    /// Value out of range
    #[error("Value {0} out of range ({1}..{2})")]
    ValueOutOfRange(i64, i64, i64),

    /// The event store cannot hand out more ids in this generation
    #[error("Event store is full ({0} events)")]
    StoreFull(usize),

    /// Audio playback failed
    #[error("Playback failed: {0}")]
    Playback(String),

    /// The configuration document is not valid JSON
    #[error(transparent)]
    Document(#[from] serde_json::Error),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Import needed for Result type extension
pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod config;
pub mod datetime;
pub mod detector;
pub mod effects;
pub mod event;
pub mod notify;
pub mod schedule;
pub mod scheduler;
pub mod timer;
pub mod zone;

// Re-export key types
pub use config::{load_events_file, parse_document, EventDefinition, ParsedDocument, Settings};
pub use datetime::{CalendarDateTime, Clock, Dst, SystemClock};
pub use detector::scan;
pub use effects::{Color, ColorKind, DisplayCursor, Pattern};
pub use event::{DueEvent, Event, EventId, EventStore};
pub use notify::{
    dispatch_channel, spawn_audio_worker, AudioMessage, AudioSink, CommandSink, Dispatcher,
    LogSink, RecordingSink,
};
pub use schedule::{advance, is_excluded, is_expired, parse_days, Days, Frequency, WEEK_DAYS};
pub use scheduler::{Control, Scheduler, UserAction};
pub use timer::IntervalGate;
pub use zone::{LocalZone, ZoneOffset};
