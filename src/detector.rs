/*!
 # Due-event detection

 Runs once per poll. Any occurrence that fell at most one detection window
 into the past fires, unless its weekday is excluded, and is then advanced
 so the same occurrence is never seen twice.
*/

use tracing::{debug, info, instrument, trace};

use crate::datetime::CalendarDateTime;
use crate::event::{EventId, EventStore};
use crate::notify::{AudioMessage, Dispatcher};
use crate::schedule::{advance, is_excluded};
use crate::zone::LocalZone;

/// Scans the store for occurrences happening now
///
/// Returns the ids of the events that were marked due. Events whose
/// occurrence is excluded by weekday, or has reached the event's end, are
/// advanced without firing.
///
/// # Arguments
///
/// * `store` - Events to scan
/// * `now` - Current local time
/// * `detection_window_secs` - How far in the past an occurrence may lie
/// * `zone` - Local time zone
/// * `dispatcher` - Queue receiving the audio notifications
#[instrument(level = "debug", skip_all, fields(now = %now))]
pub fn scan(
    store: &mut EventStore,
    now: &CalendarDateTime,
    detection_window_secs: f64,
    zone: &LocalZone,
    dispatcher: &Dispatcher,
) -> Vec<EventId> {
    let t_now = now.to_instant(zone);
    let mut fired = Vec::new();

    for event in store.iter_mut() {
        let dt = (event.scheduled_at.to_instant(zone) - t_now) as f64;
        trace!("Event {} is {}s away", event.id, dt);
        if !(-detection_window_secs <= dt && dt <= 0.0) {
            continue;
        }

        let occurrence = event.scheduled_at.normalized(zone);
        let ended = event
            .end_at
            .is_some_and(|end| occurrence.to_instant(zone) >= end.to_instant(zone));

        if is_excluded(event.exclude, occurrence.weekday) {
            debug!("Event {} excluded on {}", event.id, occurrence);
        } else if ended {
            debug!("Event {} occurrence {} is past its end", event.id, occurrence);
        } else {
            info!("Event {} '{}' is due", event.id, event.description);
            event.due_timestamp = t_now;
            event.fired_at = Some(occurrence);
            dispatcher.dispatch(AudioMessage::for_event(event, occurrence, false));
            fired.push(event.id);
        }

        event.scheduled_at = advance(&event.scheduled_at, event.frequency, now, zone);
        debug!("Event {} next occurrence {}", event.id, event.scheduled_at);
    }

    fired
}
