/*!
 # Notification dispatch

 The scheduler never waits on audio. Due events are turned into
 [`AudioMessage`]s and pushed onto a bounded queue with `try_send`; a full
 queue drops the message. A single blocking worker drains the queue and
 plays messages one after another through an [`AudioSink`].
*/

use parking_lot::Mutex;
use std::process::Command;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::datetime::CalendarDateTime;
use crate::event::{Event, EventId};
use crate::{Error, Result};

/// A request to play one notification
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMessage {
    pub event_id: EventId,
    pub description: String,
    /// Local sound file, played instead of speech when set
    pub sound: String,
    /// Speech voice reference
    pub voice: String,
    /// Instant the event fired
    pub due_timestamp: i64,
    /// Scheduled local time of the occurrence that fired
    pub occurred_at: CalendarDateTime,
    /// Append the time of day to the spoken text
    pub long_form: bool,
}

impl AudioMessage {
    /// Builds a message for `event`, whose occurrence was scheduled at `occurred_at`
    pub fn for_event(event: &Event, occurred_at: CalendarDateTime, long_form: bool) -> Self {
        Self {
            event_id: event.id,
            description: event.description.clone(),
            sound: event.sound.clone(),
            voice: event.voice.clone(),
            due_timestamp: event.due_timestamp,
            occurred_at,
            long_form,
        }
    }

    /// Text handed to speech synthesis
    pub fn speech_text(&self) -> String {
        if self.long_form {
            format!(
                "{} occurred at {} hours, {} minutes, and {} seconds.",
                self.description,
                self.occurred_at.hour,
                self.occurred_at.minute,
                self.occurred_at.second
            )
        } else {
            self.description.clone()
        }
    }
}

/// Producer side of the dispatch queue
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<AudioMessage>,
}

/// Creates a bounded dispatch queue
pub fn dispatch_channel(capacity: usize) -> (Dispatcher, mpsc::Receiver<AudioMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Dispatcher { tx }, rx)
}

impl Dispatcher {
    /// Enqueues a message without waiting
    ///
    /// Returns false when the message was dropped because the queue is full
    /// or the worker has gone away.
    pub fn dispatch(&self, message: AudioMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                debug!(
                    "Audio queue full, dropping notification for event {}",
                    message.event_id
                );
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!(
                    "Audio worker stopped, dropping notification for event {}",
                    message.event_id
                );
                false
            }
        }
    }
}

/// Something that can play a notification, blocking until done
pub trait AudioSink: Send + 'static {
    fn play(&mut self, message: &AudioMessage) -> Result<()>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn play(&mut self, message: &AudioMessage) -> Result<()> {
        (**self).play(message)
    }
}

/// Writes notifications to the log instead of playing them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play(&mut self, message: &AudioMessage) -> Result<()> {
        if message.sound.is_empty() {
            info!("Speaking ({}): {}", voice_label(&message.voice), message.speech_text());
        } else {
            info!("Playing {} for event {}", message.sound, message.event_id);
        }
        Ok(())
    }
}

fn voice_label(voice: &str) -> &str {
    if voice.is_empty() {
        "default voice"
    } else {
        voice
    }
}

/// Keeps every message it is asked to play
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    played: Arc<Mutex<Vec<AudioMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages played so far
    pub fn played(&self) -> Vec<AudioMessage> {
        self.played.lock().clone()
    }
}

impl AudioSink for RecordingSink {
    fn play(&mut self, message: &AudioMessage) -> Result<()> {
        self.played.lock().push(message.clone());
        Ok(())
    }
}

/// Plays notifications through external programs
///
/// Speech runs `speak` with the voice (after `voice_flag`, if both are set)
/// and the text appended; sound files run `play` with the path appended.
#[derive(Debug, Clone, Default)]
pub struct CommandSink {
    /// Speech command line, e.g. `espeak -s 150`
    pub speak: Option<String>,
    /// Flag that introduces the voice, e.g. `-v`
    pub voice_flag: Option<String>,
    /// Sound command line, e.g. `aplay -q`
    pub play: Option<String>,
}

impl CommandSink {
    fn command(line: &str) -> Result<Command> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Playback("empty command line".to_string()))?;
        let mut command = Command::new(program);
        command.args(parts);
        Ok(command)
    }
}

impl AudioSink for CommandSink {
    #[instrument(skip(self, message), fields(event = message.event_id))]
    fn play(&mut self, message: &AudioMessage) -> Result<()> {
        let mut command = match (&self.play, &self.speak) {
            (Some(play), _) if !message.sound.is_empty() => {
                let mut command = Self::command(play)?;
                command.arg(&message.sound);
                command
            }
            (_, Some(speak)) => {
                let mut command = Self::command(speak)?;
                if let (Some(flag), false) = (&self.voice_flag, message.voice.is_empty()) {
                    command.arg(flag).arg(&message.voice);
                }
                command.arg(message.speech_text());
                command
            }
            _ => return LogSink.play(message),
        };

        debug!("Running {:?}", command);
        let status = command.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Playback(format!("{:?} exited with {}", command.get_program(), status)))
        }
    }
}

/// Starts the audio worker on the blocking thread pool
///
/// Messages are played one at a time in queue order. The worker ends when
/// every [`Dispatcher`] has been dropped and the queue is drained.
pub fn spawn_audio_worker<S: AudioSink>(
    mut rx: mpsc::Receiver<AudioMessage>,
    mut sink: S,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        info!("Audio worker started");
        while let Some(message) = rx.blocking_recv() {
            debug!("Playing notification for event {}", message.event_id);
            if let Err(e) = sink.play(&message) {
                error!("Notification for event {} failed: {}", message.event_id, e);
            }
        }
        info!("Audio worker stopped");
    })
}
