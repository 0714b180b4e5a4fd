//! Job execution span helpers.
//!
//! Provides span creation and state-transition recording for jobs
//! flowing through the queue worker.

use tracing::Span;

use crate::model::{JobId, JobState, SubmitterId};

/// Start a span covering one job from dequeue to release.
///
/// The `job.state` field is declared empty and is updated by
/// [`record_state_transition`].
pub fn start_job_span(id: &JobId, submitter: &SubmitterId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.id" = %id,
        "job.submitter" = %submitter,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the job span.
///
/// Emits a tracing `info` event scoped to the given span.
pub fn record_state_transition(span: &Span, from: JobState, to: JobState) {
    span.record("job.state", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}
