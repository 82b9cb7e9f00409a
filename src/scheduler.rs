/*!
 # Scheduler

 The [`Scheduler`] owns the event store and is the only code that touches
 it. It reloads the store from an events document, polls it for due events
 on a fixed cadence, and reacts to the two button gestures.

 Audio leaves through the [`Dispatcher`]; the scheduler never waits on it.
*/

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{parse_document, Settings};
use crate::datetime::{CalendarDateTime, Clock};
use crate::detector;
use crate::effects::DisplayCursor;
use crate::event::{DueEvent, EventId, EventStore};
use crate::notify::{AudioMessage, Dispatcher};
use crate::timer::IntervalGate;
use crate::zone::LocalZone;
use crate::Result;

/// Instants before 2017-01-01 mean the clock has not been set yet
pub const CLOCK_SYNC_THRESHOLD: i64 = 1_483_228_800;

/// Cadence of the run loop, also the LED frame rate
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Button gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Replay every due event with its time of day
    ShortPress,
    /// Clear all due flags
    LongPress,
}

/// Messages accepted by [`Scheduler::run`]
#[derive(Debug)]
pub enum Control {
    Action(UserAction),
    /// Replace the store from an events document
    Reload(String, oneshot::Sender<Result<usize>>),
    /// Replace the store from an events file, see [`Scheduler::reload_file`]
    ReloadFile(PathBuf, oneshot::Sender<Result<usize>>),
    /// Report the due events
    Status(oneshot::Sender<Vec<DueEvent>>),
}

/// Owner of the event store
#[derive(Debug)]
pub struct Scheduler {
    zone: LocalZone,
    settings: Settings,
    store: EventStore,
    dispatcher: Dispatcher,
    poll_gate: IntervalGate,
    restart_needed: bool,
}

impl Scheduler {
    pub fn new(zone: LocalZone, settings: Settings, dispatcher: Dispatcher) -> Self {
        Self {
            zone,
            settings,
            store: EventStore::new(),
            dispatcher,
            poll_gate: IntervalGate::new(),
            restart_needed: false,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn zone(&self) -> &LocalZone {
        &self.zone
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether the last reload failed and the surrounding system should restart
    pub fn restart_needed(&self) -> bool {
        self.restart_needed
    }

    /// Rebuilds the store from an events document
    ///
    /// The previous events are dropped first, even if the document turns out
    /// to be unparseable; in that case the restart flag is raised and the
    /// error returned. Malformed records are skipped. Returns the number of
    /// events loaded.
    #[instrument(skip(self, document), fields(len = document.len()))]
    pub fn reload(&mut self, document: &str, now: i64) -> Result<usize> {
        self.store.clear();

        let parsed = match parse_document(document) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Events document unreadable, restart needed: {}", e);
                self.restart_needed = true;
                return Err(e);
            }
        };

        if let Some(name) = &parsed.timezone {
            match name.parse::<LocalZone>() {
                Ok(zone) => {
                    debug!("Time zone set to {}", zone.as_str());
                    self.zone = zone;
                }
                Err(e) => warn!("Keeping time zone {}: {}", self.zone.as_str(), e),
            }
        }

        let local_now = CalendarDateTime::from_instant(now, &self.zone);
        for definition in parsed.definitions {
            if let Err(e) = self.store.insert(definition, &local_now, &self.zone) {
                warn!("Stopped loading events: {}", e);
                break;
            }
        }

        self.restart_needed = false;
        info!(
            "Loaded {} events (generation {}, {} skipped)",
            self.store.len(),
            self.store.generation(),
            parsed.skipped
        );
        Ok(self.store.len())
    }

    /// Reads an events document from disk and reloads from it
    pub fn reload_file(&mut self, path: impl AsRef<Path>, now: i64) -> Result<usize> {
        let path = path.as_ref();
        let document = match std::fs::read_to_string(path) {
            Ok(document) => document,
            Err(e) => {
                error!("Cannot read {}: {}", path.display(), e);
                self.store.clear();
                self.restart_needed = true;
                return Err(e.into());
            }
        };
        self.reload(&document, now)
    }

    /// Polls for due events once the poll interval has elapsed
    ///
    /// Does nothing while the wall clock is unsynchronised.
    pub fn tick(&mut self, monotonic: Instant, now: i64) -> Vec<EventId> {
        if !self.poll_gate.ready(monotonic, self.settings.poll_interval) {
            return Vec::new();
        }
        if now < CLOCK_SYNC_THRESHOLD {
            trace!("Clock not set ({}), skipping poll", now);
            return Vec::new();
        }
        self.scan(now)
    }

    /// Runs the due-event detector at `now`
    pub fn scan(&mut self, now: i64) -> Vec<EventId> {
        let local_now = CalendarDateTime::from_instant(now, &self.zone);
        detector::scan(
            &mut self.store,
            &local_now,
            self.settings.detection_window_secs,
            &self.zone,
            &self.dispatcher,
        )
    }

    /// Reacts to a button gesture
    ///
    /// Returns how many notifications were replayed or cleared.
    #[instrument(skip(self))]
    pub fn handle(&mut self, action: UserAction, now: i64) -> usize {
        match action {
            UserAction::ShortPress => self.replay(),
            UserAction::LongPress => self.clear_notifications(now),
        }
    }

    /// Queues a long-form notification for every due event
    pub fn replay(&self) -> usize {
        let mut queued = 0;
        for event in self.store.iter().filter(|event| event.is_due()) {
            let occurred_at = event
                .fired_at
                .unwrap_or_else(|| CalendarDateTime::from_instant(event.due_timestamp, &self.zone));
            if self
                .dispatcher
                .dispatch(AudioMessage::for_event(event, occurred_at, true))
            {
                queued += 1;
            }
        }
        info!("Replaying {} due notifications", queued);
        queued
    }

    /// Clears every due flag, pruning expired events if configured to
    pub fn clear_notifications(&mut self, now: i64) -> usize {
        let cleared = self.store.clear_due();
        info!("Cleared {} notifications", cleared);
        if self.settings.prune_on_clear {
            let local_now = CalendarDateTime::from_instant(now, &self.zone);
            let pruned = self.store.prune_expired(&local_now, &self.zone);
            if pruned > 0 {
                info!("Pruned {} expired events", pruned);
            }
        }
        cleared
    }

    /// Snapshot of the due events, in store order
    pub fn due_events(&self) -> Vec<DueEvent> {
        self.store.due_events()
    }

    /// Drives the scheduler until the control channel closes
    ///
    /// Polls on the configured interval, rotates the visual notifier through
    /// the due events and answers control messages in between. Returns the
    /// scheduler so its final state can be inspected.
    pub async fn run<C: Clock + Send>(mut self, clock: C, mut control: mpsc::Receiver<Control>) -> Self {
        let mut frames = tokio::time::interval(FRAME_INTERVAL.min(self.settings.poll_interval));
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cursor = DisplayCursor::new(self.settings.display_interval);

        info!("Scheduler running with {} events", self.store.len());
        loop {
            tokio::select! {
                at = frames.tick() => {
                    let monotonic = at.into_std();
                    let fired = self.tick(monotonic, clock.now());
                    if !fired.is_empty() {
                        debug!("Events fired: {:?}", fired);
                    }
                    let due = self.due_events();
                    let before = cursor.showing();
                    let shown = cursor.select(&due, monotonic).map(|event| (event.id, event.pattern, event.color));
                    if let Some((id, pattern, color)) = shown {
                        if before != Some(id) {
                            info!("Showing event {} as {:?} {:?}", id, pattern, color);
                        }
                    }
                }
                message = control.recv() => {
                    match message {
                        Some(Control::Action(action)) => {
                            self.handle(action, clock.now());
                        }
                        Some(Control::Reload(document, reply)) => {
                            let result = self.reload(&document, clock.now());
                            if reply.send(result).is_err() {
                                debug!("Reload requester went away");
                            }
                        }
                        Some(Control::ReloadFile(path, reply)) => {
                            let result = self.reload_file(&path, clock.now());
                            if reply.send(result).is_err() {
                                debug!("Reload requester went away");
                            }
                        }
                        Some(Control::Status(reply)) => {
                            if reply.send(self.due_events()).is_err() {
                                debug!("Status requester went away");
                            }
                        }
                        None => {
                            info!("Control channel closed, scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
        self
    }
}
