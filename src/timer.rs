/*!
 # Interval gating

 Each periodic call site owns its own [`IntervalGate`], so a fast pattern
 tick can never reset the timer of a slower poll.
*/

use std::time::{Duration, Instant};

/// Remembers when a periodic action last ran
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalGate {
    last_fired: Option<Instant>,
}

impl IntervalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true (and restarts the interval) once `interval` has elapsed
    ///
    /// The first call is always ready.
    pub fn ready(&mut self, now: Instant, interval: Duration) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    /// When the gate last opened
    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Forget the last firing so the next call is ready
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
