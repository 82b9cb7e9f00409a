/*!
 # Visual notification payload

 This module defines the LED pattern and color selectors carried by each
 event, and the cursor the visual notifier uses to cycle through due events.
 Rendering itself happens elsewhere.
*/

use std::time::{Duration, Instant};
use tracing::debug;

use crate::event::{DueEvent, EventId};
use crate::timer::IntervalGate;
use crate::{Error, Result};

/// LED patterns available for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// Solid color with a breathing brightness
    #[default]
    Solid,
    /// Two quick flashes and a pause
    Blink,
    /// Color spinning around the ring
    Spin,
    /// Random sparkles
    Twinkle,
}

impl Pattern {
    /// Selector value used in the events document
    pub fn selector(&self) -> u8 {
        match self {
            Pattern::Solid => 0,
            Pattern::Blink => 1,
            Pattern::Spin => 2,
            Pattern::Twinkle => 3,
        }
    }
}

impl TryFrom<u8> for Pattern {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Pattern::Solid),
            1 => Ok(Pattern::Blink),
            2 => Ok(Pattern::Spin),
            3 => Ok(Pattern::Twinkle),
            other => Err(Error::ValueOutOfRange(other as i64, 0, 3)),
        }
    }
}

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn from_u24(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    fn to_u24(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Expands a 12-bit `0xRGB` color
    fn from_u12(value: u32) -> Self {
        let nibble = |shift: u32| ((value >> shift) & 0xF) as u8 * 17;
        Self::new(nibble(8), nibble(4), nibble(0))
    }

    fn to_u12(self) -> u32 {
        ((self.r as u32) >> 4) << 8 | ((self.g as u32) >> 4) << 4 | (self.b as u32) >> 4
    }
}

/// Color selection for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorKind {
    /// A single fixed color
    Rgb(Color),
    /// Cycle through the hue wheel
    Rainbow,
    /// Alternate between two colors
    TwoTone(Color, Color),
    /// Pick a random color on each cycle
    Random,
}

impl Default for ColorKind {
    fn default() -> Self {
        ColorKind::Rgb(Color::new(255, 0, 0))
    }
}

const TAG_RGB: u32 = 0x00;
const TAG_RAINBOW: u32 = 0x01;
const TAG_RANDOM: u32 = 0x02;
const TAG_TWO_TONE: u32 = 0x03;

impl ColorKind {
    /// Decodes the 32-bit color value stored in the events document
    ///
    /// The high byte selects the kind; the low 24 bits hold `0xRRGGBB` for
    /// a fixed color, or two 12-bit `0xRGB` colors for two-tone.
    pub fn from_wire(value: u32) -> Result<Self> {
        let payload = value & 0x00FF_FFFF;
        match value >> 24 {
            TAG_RGB => Ok(ColorKind::Rgb(Color::from_u24(payload))),
            TAG_RAINBOW => Ok(ColorKind::Rainbow),
            TAG_RANDOM => Ok(ColorKind::Random),
            TAG_TWO_TONE => Ok(ColorKind::TwoTone(
                Color::from_u12(payload >> 12),
                Color::from_u12(payload & 0xFFF),
            )),
            tag => Err(Error::ValueOutOfRange(tag as i64, 0, 3)),
        }
    }

    /// Encodes back to the 32-bit document form
    ///
    /// Two-tone colors are stored with 4 bits per channel.
    pub fn to_wire(&self) -> u32 {
        match self {
            ColorKind::Rgb(color) => TAG_RGB << 24 | color.to_u24(),
            ColorKind::Rainbow => TAG_RAINBOW << 24,
            ColorKind::Random => TAG_RANDOM << 24,
            ColorKind::TwoTone(first, second) => {
                TAG_TWO_TONE << 24 | first.to_u12() << 12 | second.to_u12()
            }
        }
    }
}

/// Cycles the visual notifier through the currently due events
#[derive(Debug, Clone)]
pub struct DisplayCursor {
    index: usize,
    interval: Duration,
    gate: IntervalGate,
    showing: Option<EventId>,
}

impl DisplayCursor {
    /// Creates a cursor that moves to the next due event every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            index: 0,
            interval,
            gate: IntervalGate::new(),
            showing: None,
        }
    }

    /// Id of the event currently on display
    pub fn showing(&self) -> Option<EventId> {
        self.showing
    }

    /// Picks the due event to display at `now`
    ///
    /// Stays on the same event until the interval elapses, then rotates.
    /// Returns `None` and clears the display when nothing is due.
    pub fn select<'a>(&mut self, due: &'a [DueEvent], now: Instant) -> Option<&'a DueEvent> {
        if due.is_empty() {
            if self.showing.take().is_some() {
                debug!("No due events, display cleared");
            }
            self.index = 0;
            self.gate.reset();
            return None;
        }

        // The store may have shrunk or the shown event may have been cleared
        let still_showing = self
            .showing
            .and_then(|id| due.iter().position(|event| event.id == id));

        if self.gate.ready(now, self.interval) {
            self.index = match (still_showing, self.showing) {
                (Some(position), _) => (position + 1) % due.len(),
                (None, Some(_)) => self.index % due.len(),
                (None, None) => 0,
            };
        } else if let Some(position) = still_showing {
            self.index = position;
        } else {
            self.index %= due.len();
        }

        let event = &due[self.index];
        if self.showing != Some(event.id) {
            debug!("Displaying event {} ({})", event.id, event.description);
        }
        self.showing = Some(event.id);
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn due(id: EventId) -> DueEvent {
        DueEvent {
            id,
            description: format!("event {id}"),
            pattern: Pattern::Solid,
            color: ColorKind::Rainbow,
            due_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn decodes_wire_colors() {
        assert_eq!(
            ColorKind::from_wire(0x00FF_8000).unwrap(),
            ColorKind::Rgb(Color::new(255, 128, 0))
        );
        assert_eq!(ColorKind::from_wire(0x0100_0000).unwrap(), ColorKind::Rainbow);
        assert_eq!(ColorKind::from_wire(0x0200_0000).unwrap(), ColorKind::Random);
        assert_eq!(
            ColorKind::from_wire(0x03F0_00F0).unwrap(),
            ColorKind::TwoTone(Color::new(255, 0, 0), Color::new(0, 255, 0))
        );
        assert!(ColorKind::from_wire(0x0700_0000).is_err());
    }

    #[test]
    fn encodes_wire_colors() {
        let two_tone = ColorKind::TwoTone(Color::new(0x11, 0x22, 0x33), Color::new(0xFF, 0, 0xFF));
        assert_eq!(two_tone.to_wire(), 0x0312_3F0F);
        assert_eq!(ColorKind::from_wire(two_tone.to_wire()).unwrap(), two_tone);
        assert_eq!(ColorKind::Rgb(Color::new(1, 2, 3)).to_wire(), 0x0001_0203);
    }

    #[test]
    fn pattern_selectors() {
        assert_eq!(Pattern::try_from(2).unwrap(), Pattern::Spin);
        assert_eq!(Pattern::Twinkle.selector(), 3);
        assert!(Pattern::try_from(9).is_err());
    }

    #[test]
    fn cursor_rotates_on_interval() {
        let start = Instant::now();
        let interval = Duration::from_millis(3000);
        let events = vec![due(0), due(2), due(5)];
        let mut cursor = DisplayCursor::new(interval);

        assert_eq!(cursor.select(&events, start).map(|e| e.id), Some(0));
        assert_eq!(cursor.select(&events, start + Duration::from_millis(1000)).map(|e| e.id), Some(0));
        assert_eq!(cursor.select(&events, start + interval).map(|e| e.id), Some(2));
        assert_eq!(cursor.select(&events, start + interval * 2).map(|e| e.id), Some(5));
        assert_eq!(cursor.select(&events, start + interval * 3).map(|e| e.id), Some(0));
        assert_eq!(cursor.showing(), Some(0));
    }

    #[test]
    fn cursor_follows_shown_event_and_clears() {
        let start = Instant::now();
        let interval = Duration::from_millis(3000);
        let mut cursor = DisplayCursor::new(interval);

        let events = vec![due(1), due(3)];
        cursor.select(&events, start);
        cursor.select(&events, start + interval);
        assert_eq!(cursor.showing(), Some(3));

        // A new due event ahead of the shown one does not steal the display
        let grown = vec![due(0), due(1), due(3)];
        let shown = cursor.select(&grown, start + interval + Duration::from_millis(10));
        assert_eq!(shown.map(|e| e.id), Some(3));

        assert!(cursor.select(&[], start + interval * 2).is_none());
        assert_eq!(cursor.showing(), None);
    }
}
