/*!
 # Events and the event store

 The store is rebuilt wholesale whenever the configuration changes; within
 one generation events are only advanced, marked due, cleared or pruned.
*/

use tracing::{debug, info};

use crate::config::EventDefinition;
use crate::datetime::CalendarDateTime;
use crate::effects::{ColorKind, Pattern};
use crate::schedule::{advance, is_expired, Frequency};
use crate::zone::LocalZone;
use crate::{Error, Result};

/// Identifier of an event within one store generation
pub type EventId = u16;

/// A user-defined recurring event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Sequential id, restarting at 0 on every reload
    pub id: EventId,
    /// Text spoken when the event fires
    pub description: String,
    /// Next (or currently due) occurrence
    pub scheduled_at: CalendarDateTime,
    /// Occurrences at or after this instant never fire
    pub end_at: Option<CalendarDateTime>,
    /// Recurrence of the event
    pub frequency: Frequency,
    /// Weekday exclusion mask, bit 0 = Sunday
    pub exclude: u8,
    /// LED pattern shown while due
    pub pattern: Pattern,
    /// LED color shown while due
    pub color: ColorKind,
    /// Local sound file played instead of speech, if not empty
    pub sound: String,
    /// Speech voice reference
    pub voice: String,
    /// Instant of the most recent firing, 0 when not due
    pub due_timestamp: i64,
    /// Scheduled local time of the occurrence that made the event due
    pub fired_at: Option<CalendarDateTime>,
}

impl Event {
    /// Whether the event fired and has not been cleared
    pub fn is_due(&self) -> bool {
        self.due_timestamp != 0
    }

    /// Whether the event has no future occurrence left
    ///
    /// A recurring event without an end always has one, even when the
    /// detector missed its last occurrence. One with an end is checked
    /// against the first occurrence after `now`.
    pub fn is_expired(&self, now: &CalendarDateTime, zone: &LocalZone) -> bool {
        if self.scheduled_at.is_expired_sentinel() {
            return true;
        }
        match (self.frequency, &self.end_at) {
            (Frequency::Once, end) => is_expired(&self.scheduled_at, end.as_ref(), now, zone),
            (_, None) => false,
            (frequency, Some(end)) => {
                let upcoming = advance(&self.scheduled_at, frequency, now, zone);
                upcoming.is_expired_sentinel() || is_expired(&upcoming, Some(end), now, zone)
            }
        }
    }
}

/// Snapshot of a due event for the visual notifier
#[derive(Debug, Clone, PartialEq)]
pub struct DueEvent {
    pub id: EventId,
    pub description: String,
    pub pattern: Pattern,
    pub color: ColorKind,
    pub due_timestamp: i64,
}

impl From<&Event> for DueEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            description: event.description.clone(),
            pattern: event.pattern,
            color: event.color,
            due_timestamp: event.due_timestamp,
        }
    }
}

/// Ordered collection of events owned by the scheduler
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
    generation: u32,
    next_id: EventId,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reloads since the store was created
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every event and starts a new generation
    pub fn clear(&mut self) {
        self.events.clear();
        self.next_id = 0;
        self.generation = self.generation.wrapping_add(1);
        debug!("Event store cleared, generation {}", self.generation);
    }

    /// Adds an event, scheduling its first occurrence after `now`
    pub fn insert(
        &mut self,
        definition: EventDefinition,
        now: &CalendarDateTime,
        zone: &LocalZone,
    ) -> Result<EventId> {
        if self.next_id == EventId::MAX {
            return Err(Error::StoreFull(self.events.len()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let scheduled_at = advance(&definition.start, definition.frequency, now, zone);
        debug!(
            "Event {} '{}' ({}) first occurrence {}",
            id, definition.description, definition.frequency, scheduled_at
        );

        self.events.push(Event {
            id,
            description: definition.description,
            scheduled_at,
            end_at: definition.end,
            frequency: definition.frequency,
            exclude: definition.exclude,
            pattern: definition.pattern,
            color: definition.color,
            sound: definition.sound,
            voice: definition.voice,
            due_timestamp: 0,
            fired_at: None,
        });
        Ok(id)
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Event> {
        self.events.iter_mut()
    }

    /// Snapshot of every event currently marked due
    pub fn due_events(&self) -> Vec<DueEvent> {
        self.events
            .iter()
            .filter(|event| event.is_due())
            .map(DueEvent::from)
            .collect()
    }

    /// Resets every due flag, returning how many were set
    pub fn clear_due(&mut self) -> usize {
        let mut cleared = 0;
        for event in self.events.iter_mut().filter(|event| event.is_due()) {
            event.due_timestamp = 0;
            event.fired_at = None;
            cleared += 1;
        }
        cleared
    }

    /// Removes events with no future occurrence, returning how many went
    pub fn prune_expired(&mut self, now: &CalendarDateTime, zone: &LocalZone) -> usize {
        let before = self.events.len();
        self.events.retain(|event| {
            let expired = event.is_expired(now, zone);
            if expired {
                info!("Pruning expired event {} '{}'", event.id, event.description);
            }
            !expired
        });
        before - self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(description: &str, frequency: Frequency, start: CalendarDateTime) -> EventDefinition {
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

    #[test]
    fn ids_restart_each_generation() {
        let tz = LocalZone::utc();
        let now = CalendarDateTime::new(2024, 5, 1, 12, 0, 0);
        let mut store = EventStore::new();

        for name in ["a", "b", "c"] {
            store
                .insert(definition(name, Frequency::Daily, CalendarDateTime::new(2024, 1, 1, 8, 0, 0)), &now, &tz)
                .unwrap();
        }
        assert_eq!(store.iter().map(|e| e.id).collect::<Vec<_>>(), vec![0, 1, 2]);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.generation(), 1);
        let id = store
            .insert(definition("d", Frequency::Daily, CalendarDateTime::new(2024, 1, 1, 8, 0, 0)), &now, &tz)
            .unwrap();
        assert_eq!(id, 0);
    }

    #[test]
    fn insert_schedules_first_occurrence() {
        let tz = LocalZone::utc();
        let now = CalendarDateTime::new(2024, 5, 1, 12, 0, 0);
        let mut store = EventStore::new();
        let id = store
            .insert(definition("tea", Frequency::Daily, CalendarDateTime::new(2024, 1, 1, 8, 0, 0)), &now, &tz)
            .unwrap();

        let event = store.get(id).unwrap();
        assert_eq!((event.scheduled_at.month_number(), event.scheduled_at.day), (5, 2));
        assert_eq!(event.scheduled_at.hour, 8);
        assert!(!event.is_due());
    }

    #[test]
    fn clear_due_and_prune() {
        let tz = LocalZone::utc();
        let now = CalendarDateTime::new(2024, 5, 1, 12, 0, 0);
        let mut store = EventStore::new();
        store
            .insert(definition("past", Frequency::Once, CalendarDateTime::new(2024, 4, 1, 8, 0, 0)), &now, &tz)
            .unwrap();
        store
            .insert(definition("daily", Frequency::Daily, CalendarDateTime::new(2024, 4, 1, 8, 0, 0)), &now, &tz)
            .unwrap();

        for event in store.iter_mut() {
            event.due_timestamp = 1_714_564_800;
        }
        assert_eq!(store.due_events().len(), 2);
        assert_eq!(store.clear_due(), 2);
        assert!(store.due_events().is_empty());

        assert_eq!(store.prune_expired(&now, &tz), 1);
        assert_eq!(store.iter().map(|e| e.description.as_str()).collect::<Vec<_>>(), vec!["daily"]);
    }

    #[test]
    fn missed_recurring_event_survives_prune() {
        let tz = LocalZone::utc();
        let loaded = CalendarDateTime::new(2024, 5, 1, 7, 0, 0);
        let mut store = EventStore::new();
        store
            .insert(definition("daily", Frequency::Daily, CalendarDateTime::new(2024, 5, 1, 8, 0, 0)), &loaded, &tz)
            .unwrap();

        // The 08:00 occurrence was never scanned
        let later = CalendarDateTime::new(2024, 5, 3, 12, 0, 0);
        assert!(!store.get(0).unwrap().is_expired(&later, &tz));
        assert_eq!(store.prune_expired(&later, &tz), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn recurring_event_expires_at_its_end() {
        let tz = LocalZone::utc();
        let loaded = CalendarDateTime::new(2024, 5, 1, 7, 0, 0);
        let mut store = EventStore::new();
        let mut bounded = definition("bounded", Frequency::Daily, CalendarDateTime::new(2024, 5, 1, 8, 0, 0));
        bounded.end = Some(CalendarDateTime::new(2024, 5, 4, 0, 0, 0));
        store.insert(bounded, &loaded, &tz).unwrap();

        // Missed, but 05-02 and 05-03 are still ahead
        let missed = CalendarDateTime::new(2024, 5, 1, 9, 0, 0);
        assert_eq!(store.prune_expired(&missed, &tz), 0);

        let last_done = CalendarDateTime::new(2024, 5, 3, 9, 0, 0);
        assert_eq!(store.prune_expired(&last_done, &tz), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_due_forgets_firing_time() {
        let tz = LocalZone::utc();
        let now = CalendarDateTime::new(2024, 5, 1, 12, 0, 0);
        let mut store = EventStore::new();
        store
            .insert(definition("tea", Frequency::Daily, CalendarDateTime::new(2024, 1, 1, 8, 0, 0)), &now, &tz)
            .unwrap();
        for event in store.iter_mut() {
            event.due_timestamp = 1_714_564_800;
            event.fired_at = Some(CalendarDateTime::new(2024, 5, 1, 12, 0, 0));
        }

        store.clear_due();
        assert_eq!(store.get(0).unwrap().fired_at, None);
    }
}
