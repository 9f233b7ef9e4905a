//! Pipeline event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers (and the CLI) can
//! see what the orchestrator has done lately.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::ids::{EventId, Fingerprint, TaskId};
use crate::stage::Stage;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    FileSubmitted {
        fingerprint: Fingerprint,
    },
    StageDispatched {
        fingerprint: Fingerprint,
        task_id: TaskId,
        stage: Stage,
    },
    StageCompleted {
        fingerprint: Fingerprint,
        task_id: TaskId,
        stage: Stage,
        success: bool,
    },
    TaskTimedOut {
        fingerprint: Fingerprint,
        task_id: TaskId,
        stage: Stage,
    },
    FileSucceeded {
        fingerprint: Fingerprint,
    },
    FileFailed {
        fingerprint: Fingerprint,
        stage: Stage,
        error: String,
    },
}

impl EventPayload {
    /// The fingerprint every payload is about.
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::FileSubmitted { fingerprint }
            | Self::StageDispatched { fingerprint, .. }
            | Self::StageCompleted { fingerprint, .. }
            | Self::TaskTimedOut { fingerprint, .. }
            | Self::FileSucceeded { fingerprint }
            | Self::FileFailed { fingerprint, .. } => fingerprint,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh id and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::parse(s).unwrap()
    }

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let task_id = TaskId::new();
        bus.broadcast(EventPayload::StageDispatched {
            fingerprint: fp("abc123"),
            task_id,
            stage: Stage::ExtractAudio,
        });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::StageDispatched { task_id: received, stage, .. } => {
                assert_eq!(*received, task_id);
                assert_eq!(*stage, Stage::ExtractAudio);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(event.payload.fingerprint().as_str(), "abc123");
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        for _ in 0..150 {
            bus.broadcast(EventPayload::FileSubmitted { fingerprint: fp("abc123") });
        }
        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::new(16);
        for _ in 0..10 {
            bus.broadcast(EventPayload::FileSubmitted { fingerprint: fp("xyz") });
        }
        bus.broadcast(EventPayload::FileSucceeded { fingerprint: fp("deadbeef") });

        let recent = bus.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(
            recent[0].payload,
            EventPayload::FileSucceeded { fingerprint: fp("deadbeef") }
        );
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::FileFailed {
            fingerprint: fp("deadbeef"),
            stage: Stage::ExtractAudio,
            error: "codec error".into(),
        });
    }

    #[test]
    fn payload_is_tagged() {
        let json = serde_json::to_value(EventPayload::TaskTimedOut {
            fingerprint: fp("xyz"),
            task_id: TaskId::new(),
            stage: Stage::Transcribe,
        })
        .unwrap();
        assert_eq!(json["type"], "task_timed_out");
        assert_eq!(json["stage"], "transcribe");
    }

    #[test]
    fn default_event_bus() {
        let bus = EventBus::default();
        assert!(bus.recent_events(10).is_empty());
    }
}
