#![allow(dead_code)]
use smart_button::*;

pub const EASTERN: &str = "America/New_York";

pub fn eastern() -> LocalZone {
    EASTERN.parse().expect("known zone")
}

/// Normalized local time in the given zone
pub fn local(zone: &LocalZone, y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> CalendarDateTime {
    CalendarDateTime::new(y, m, d, h, min, s).normalized(zone)
}

/// Instant of a local time in the given zone
pub fn instant(zone: &LocalZone, y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
    CalendarDateTime::new(y, m, d, h, min, s).to_instant(zone)
}

/// A plain event definition with no exclusions and no end
pub fn definition(description: &str, frequency: Frequency, start: CalendarDateTime) -> EventDefinition {
    EventDefinition {
        description: description.to_string(),
        frequency,
        start,
        end: None,
        exclude: 0,
        pattern: Pattern::Solid,
        color: ColorKind::default(),
        sound: String::new(),
        voice: String::new(),
    }
}
