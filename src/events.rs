//! Pipeline event plane.
//!
//! Frame and status events fan out to subscribers over bounded
//! channels. Delivery is fire-and-forget: a subscriber that stops
//! draining loses events rather than stalling the producer, and a
//! dropped receiver is pruned on the next emit. Events enqueue in
//! emission order per subscriber, so a recording-time update always
//! arrives after the frames it was computed alongside.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use crate::frame::SharedFrame;
use crate::metadata::MetadataRecord;
use crate::source::InputType;

/// Queue depth per subscriber. At file rates (tens of frames per
/// second) this absorbs a UI hiccup of a couple of seconds.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Everything the pipeline tells its consumers.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// A frame ready for display.
    Frame(SharedFrame),
    /// Human-readable status line.
    Status(String),
    /// Fresh source description (type, resolution, fps, position...).
    SourceInfo(serde_json::Value),
    /// A different kind of source was opened.
    InputTypeChanged(InputType),
    /// The open source was closed.
    InputClosed,
    /// Formatted `HH:MM:SS` elapsed time of the active recording.
    RecordingTime(String),
    /// A recording was finalized without an explicit stop call (the
    /// source was closed or switched mid-session). Carries the record
    /// so no finished session is ever dropped.
    RecordingFinalized(MetadataRecord),
}

/// Multi-subscriber event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<SyncSender<PipelineEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = sync_channel(EVENT_QUEUE_DEPTH);
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    /// Deliver an event to every live subscriber.
    ///
    /// Full queues drop this event for that subscriber only;
    /// disconnected subscribers are removed.
    pub fn emit(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .len()
    }
}
