mod common;

use common::*;
use smart_button::*;
use std::io::Write;
use std::time::{Duration, Instant};

const DOCUMENT: &str = r#"{
  "events": [
    {"d": "Feed Fish, Morning", "f": "d", "e": 65, "sd": [2024, 9, 25], "t": [8, 0, 0]},
    {"d": "Dentist", "f": "o", "sd": [2024, 9, 30], "t": [8, 0]},
    {"d": "Broken frequency", "f": "x", "sd": [2024, 9, 25], "t": [8, 0]},
    {"d": "Broken date", "f": "d", "sd": [2024, 2, 30], "t": [8, 0]},
    {"d": "Trash night", "f": "w", "e": "sat,sun", "sd": [2024, 1, 1], "t": [20, 0],
     "p": 2, "c": 16777216}
  ]
}"#;

fn scheduler() -> (Scheduler, tokio::sync::mpsc::Receiver<AudioMessage>) {
    let (dispatcher, rx) = dispatch_channel(8);
    (Scheduler::new(eastern(), Settings::default(), dispatcher), rx)
}

#[test]
fn reload_skips_malformed_records() {
    let tz = eastern();
    let (mut scheduler, _rx) = scheduler();
    let loaded = scheduler
        .reload(DOCUMENT, instant(&tz, 2024, 9, 28, 7, 59, 0))
        .unwrap();

    assert_eq!(loaded, 3);
    assert!(!scheduler.restart_needed());
    let descriptions: Vec<_> = scheduler.store().iter().map(|e| e.description.clone()).collect();
    assert_eq!(descriptions, vec!["Feed Fish, Morning", "Dentist", "Trash night"]);
    let ids: Vec<_> = scheduler.store().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    let trash = scheduler.store().get(2).unwrap();
    assert_eq!(trash.pattern, Pattern::Spin);
    assert_eq!(trash.color, ColorKind::Rainbow);
}

#[test]
fn unparseable_document_clears_store() {
    let tz = eastern();
    let (mut scheduler, _rx) = scheduler();
    let now = instant(&tz, 2024, 9, 28, 7, 59, 0);
    scheduler.reload(DOCUMENT, now).unwrap();
    assert_eq!(scheduler.store().len(), 3);

    assert!(scheduler.reload("{\"events\": [", now).is_err());
    assert!(scheduler.store().is_empty());
    assert!(scheduler.restart_needed());

    // A good document recovers
    scheduler.reload(DOCUMENT, now).unwrap();
    assert!(!scheduler.restart_needed());
    assert_eq!(scheduler.store().generation(), 3);
}

#[test]
fn reload_from_file() {
    let tz = eastern();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DOCUMENT.as_bytes()).unwrap();

    let (mut scheduler, _rx) = scheduler();
    let now = instant(&tz, 2024, 9, 28, 7, 59, 0);
    assert_eq!(scheduler.reload_file(file.path(), now).unwrap(), 3);

    let missing = file.path().with_extension("missing");
    assert!(scheduler.reload_file(&missing, now).is_err());
    assert!(scheduler.store().is_empty());
    assert!(scheduler.restart_needed());
}

#[test]
fn a_day_of_button_presses() {
    let tz = eastern();
    let (mut scheduler, mut rx) = scheduler();
    scheduler
        .reload(DOCUMENT, instant(&tz, 2024, 9, 28, 7, 59, 0))
        .unwrap();

    // Weekend mornings: feeding is excluded
    assert!(scheduler.scan(instant(&tz, 2024, 9, 28, 8, 0, 5)).is_empty());
    assert!(scheduler.scan(instant(&tz, 2024, 9, 29, 8, 0, 5)).is_empty());

    // Monday morning: feeding and the dentist
    let monday = instant(&tz, 2024, 9, 30, 8, 0, 5);
    assert_eq!(scheduler.scan(monday), vec![0, 1]);
    assert_eq!(rx.try_recv().unwrap().event_id, 0);
    assert_eq!(rx.try_recv().unwrap().event_id, 1);

    // Short press replays with the time of day
    assert_eq!(scheduler.handle(UserAction::ShortPress, monday + 60), 2);
    let replay = rx.try_recv().unwrap();
    assert!(replay.long_form);
    assert_eq!(
        replay.speech_text(),
        "Feed Fish, Morning occurred at 8 hours, 0 minutes, and 0 seconds."
    );
    rx.try_recv().unwrap();

    // Long press clears, and drops the finished one-shot
    assert_eq!(scheduler.handle(UserAction::LongPress, monday + 120), 2);
    assert!(scheduler.due_events().is_empty());
    assert_eq!(scheduler.store().len(), 2);
    assert!(scheduler.store().get(1).is_none());
}

#[test]
fn clear_keeps_expired_when_pruning_disabled() {
    let tz = eastern();
    let (dispatcher, _rx) = dispatch_channel(8);
    let settings = Settings {
        prune_on_clear: false,
        ..Settings::default()
    };
    let mut scheduler = Scheduler::new(eastern(), settings, dispatcher);
    scheduler
        .reload(DOCUMENT, instant(&tz, 2024, 9, 29, 9, 0, 0))
        .unwrap();

    let monday = instant(&tz, 2024, 9, 30, 8, 0, 5);
    scheduler.scan(monday);
    scheduler.handle(UserAction::LongPress, monday);
    assert_eq!(scheduler.store().len(), 3);
    assert!(scheduler.store().get(1).unwrap().scheduled_at.is_expired_sentinel());
}

#[test]
fn tick_waits_for_poll_interval() {
    let tz = eastern();
    let (mut scheduler, _rx) = scheduler();
    scheduler
        .reload(DOCUMENT, instant(&tz, 2024, 9, 29, 9, 0, 0))
        .unwrap();

    let start = Instant::now();
    let monday = instant(&tz, 2024, 9, 30, 8, 0, 5);
    assert!(scheduler.tick(start, monday - 3600).is_empty());
    assert!(scheduler.tick(start + Duration::from_millis(1999), monday).is_empty());
    assert_eq!(scheduler.tick(start + Duration::from_millis(2000), monday), vec![0, 1]);
}

#[test]
fn missed_occurrence_is_kept_on_clear() {
    let tz = eastern();
    let (mut scheduler, _rx) = scheduler();
    let document = r#"{"events": [{"d": "Vitamins", "f": "d", "sd": [2024, 5, 1], "t": [8, 0]}]}"#;
    scheduler
        .reload(document, instant(&tz, 2024, 5, 1, 7, 0, 0))
        .unwrap();

    // First poll after the window has passed
    let late = instant(&tz, 2024, 5, 1, 8, 5, 0);
    assert!(scheduler.scan(late).is_empty());
    scheduler.handle(UserAction::LongPress, late);
    assert_eq!(scheduler.store().len(), 1);

    // It is caught again after a reload
    scheduler.reload(document, late).unwrap();
    let next = scheduler.store().get(0).unwrap().scheduled_at.normalized(&tz);
    assert_eq!((next.month_number(), next.day, next.hour), (5, 2, 8));
}
