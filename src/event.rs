//! Structured events emitted by the gateway and the worker.
//!
//! Consumers subscribe to the event stream to build dashboards,
//! alerting, or audit logs. Events are the engine's voice;
//! job-scoped logs are the worker's voice.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{JobId, JobOutcome, JobState, SubmitterId};

/// A structured event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    JobAdmitted {
        id: JobId,
        submitter: SubmitterId,
        position: usize,
    },
    JobRejected {
        submitter: SubmitterId,
        reason: String,
    },
    StateTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
    StageFailed {
        id: JobId,
        stage: String,
        error: String,
    },
    JobReleased {
        id: JobId,
        submitter: SubmitterId,
        outcome: JobOutcome,
        duration_ms: u64,
    },
}

/// Fan-out of [`Event`]s to any number of subscribers.
///
/// Emitting never blocks; slow subscribers observe a lag error from
/// their receiver instead of holding up the worker.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: EventKind) {
        let event = Event {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            kind,
        };
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
