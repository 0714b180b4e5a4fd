//! Bounded FIFO work queue with one consumer.
//!
//! [`WorkQueue`] is the producer side shared by every inbound event; it is
//! cheap to clone. [`JobReceiver`] is the single consumer, owned by the
//! queue worker. Enqueueing never waits: a full queue is reported to the
//! caller as [`Admission::Full`].

pub mod admission;
pub mod registry;

use std::num::NonZeroUsize;

use tokio::sync::mpsc;

use crate::event::EventBus;
use crate::model::{Job, SubmitterId};

pub use admission::Admission;
pub use registry::{Reservation, SubmitterRegistry};

/// Producer side of the queue plus the submitter registry.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<Job>,
    registry: SubmitterRegistry,
    events: EventBus,
}

/// Consumer side of the queue. There is exactly one per [`WorkQueue`].
pub struct JobReceiver {
    rx: mpsc::Receiver<Job>,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` waiting jobs.
    pub fn new(capacity: NonZeroUsize, events: EventBus) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.get());
        let queue = Self {
            tx,
            registry: SubmitterRegistry::new(),
            events,
        };
        (queue, JobReceiver { rx })
    }

    /// Maximum number of waiting jobs.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Number of jobs waiting to be dequeued. In-flight jobs are not counted.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Does `submitter` have a job queued or in flight?
    pub fn is_reserved(&self, submitter: &SubmitterId) -> bool {
        self.registry.contains(submitter)
    }

    pub fn registry(&self) -> &SubmitterRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

impl JobReceiver {
    /// Wait for the next job in arrival order.
    ///
    /// Returns `None` once every [`WorkQueue`] handle is dropped and the
    /// queue has drained.
    pub async fn dequeue(&mut self) -> Option<Job> {
        self.rx.recv().await
    }
}
