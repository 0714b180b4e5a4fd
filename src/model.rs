//! Core data model.
//!
//! A job is one admitted chat message on its way through generation,
//! synthesis and delivery. It carries the submitter's reservation, so
//! dropping the job is what frees the submitter to be admitted again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::EventHandle;
use crate::queue::registry::Reservation;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of whoever sent an inbound event. One outstanding job each.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmitterId(pub String);

impl std::fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubmitterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubmitterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for SubmitterId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Inbound event and job
// ---------------------------------------------------------------------------

/// What the chat transport hands to the admission gateway.
///
/// The queue never looks past these three fields.
pub struct InboundEvent {
    pub submitter: SubmitterId,
    pub text: String,
    pub handle: Arc<dyn EventHandle>,
}

impl InboundEvent {
    pub fn new(
        submitter: impl Into<SubmitterId>,
        text: impl Into<String>,
        handle: Arc<dyn EventHandle>,
    ) -> Self {
        Self {
            submitter: submitter.into(),
            text: text.into(),
            handle,
        }
    }
}

/// An admitted unit of work.
///
/// Owned by the queue while waiting, by the worker once dequeued.
pub struct Job {
    pub id: JobId,
    pub submitter: SubmitterId,
    pub text: String,
    /// Opaque route back to the origin. Only used for delivery.
    pub handle: Arc<dyn EventHandle>,
    pub enqueued_at: DateTime<Utc>,
    pub(crate) reservation: Reservation,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("submitter", &self.submitter)
            .field("text", &self.text)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, waiting in the queue.
    Queued,
    /// Waiting on the generation provider.
    Generating,
    /// Rendering speech and, if configured, video.
    Synthesizing,
    /// Sending the text reply together with an attachment.
    Delivering,
    /// Sending text only (apology, disabled or failed synthesis).
    DeliveringTextOnly,
    /// Reservation released. Terminal.
    Released,
}

impl JobState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Queued, Generating)
                | (Generating, Synthesizing)
                | (Generating, DeliveringTextOnly)
                | (Synthesizing, Delivering)
                | (Synthesizing, DeliveringTextOnly)
                | (Delivering, Released)
                | (DeliveringTextOnly, Released)
        ) || (to == Released && self != Released)
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Released)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Generating => "generating",
            JobState::Synthesizing => "synthesizing",
            JobState::Delivering => "delivering",
            JobState::DeliveringTextOnly => "delivering_text_only",
            JobState::Released => "released",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How far down the degradation path a job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Text reply plus an audio or video attachment.
    Media,
    /// Text reply only; no synthesis pipeline configured.
    Text,
    /// Text reply plus the synthesis-failure notice.
    SynthesisFailed,
    /// Generation failed; the apology was sent instead.
    Apology,
    /// At least one reply could not be delivered.
    DeliveryFailed,
    /// The job's task panicked. Caught at the job boundary.
    Crashed,
}

impl JobOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Media => "media",
            JobOutcome::Text => "text",
            JobOutcome::SynthesisFailed => "synthesis_failed",
            JobOutcome::Apology => "apology",
            JobOutcome::DeliveryFailed => "delivery_failed",
            JobOutcome::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_is_reachable_from_every_live_state() {
        use JobState::*;
        for state in [Queued, Generating, Synthesizing, Delivering, DeliveringTextOnly] {
            assert!(state.can_transition_to(Released), "{state}");
        }
        assert!(!Released.can_transition_to(Released));
        assert!(Released.is_terminal());
    }

    #[test]
    fn stages_cannot_be_skipped_or_reversed() {
        use JobState::*;
        assert!(!Queued.can_transition_to(Synthesizing));
        assert!(!Queued.can_transition_to(Delivering));
        assert!(!Delivering.can_transition_to(Generating));
        assert!(!Released.can_transition_to(Queued));
    }
}
