//! One job, end to end: generate, synthesize, deliver, release.
//!
//! Nothing in here returns an error to the worker. Each failure is logged
//! and pushes the job one step down the degradation path
//! (video → audio → text → apology).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::config::Timeouts;
use crate::delivery::{APOLOGY_MESSAGE, EventHandle, SYNTHESIS_FAILED_NOTICE};
use crate::error::{Error, Result};
use crate::event::{EventBus, EventKind};
use crate::llm::Generator;
use crate::model::{Job, JobId, JobOutcome, JobState};
use crate::synthesis::{Artifact, MediaPipeline};
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

/// Everything a job needs besides itself. Shared by all jobs.
pub struct Fulfillment {
    generator: Arc<dyn Generator>,
    media: Option<MediaPipeline>,
    timeouts: Timeouts,
    events: EventBus,
}

impl Fulfillment {
    pub fn new(
        generator: Arc<dyn Generator>,
        media: Option<MediaPipeline>,
        timeouts: Timeouts,
        events: EventBus,
    ) -> Self {
        Self {
            generator,
            media,
            timeouts,
            events,
        }
    }

    /// Drive `job` to release and report how it ended.
    pub async fn run(&self, job: Job) -> JobOutcome {
        let span = start_job_span(&job.id, &job.submitter);
        self.run_job(job, span.clone()).instrument(span).await
    }

    async fn run_job(&self, job: Job, span: Span) -> JobOutcome {
        let Job {
            id,
            submitter,
            text,
            handle,
            enqueued_at,
            reservation,
        } = job;

        let waited_ms = (Utc::now() - enqueued_at).num_milliseconds();
        info!(%submitter, waited_ms, "job started");

        let mut progress = Progress {
            id,
            state: JobState::Queued,
            span: &span,
            events: &self.events,
        };

        progress.advance(JobState::Generating);
        let outcome = match self.generate(&text).await {
            Err(e) => {
                warn!(error = %e, "generation failed, sending apology");
                self.stage_failed(id, "generation", &e);
                progress.advance(JobState::DeliveringTextOnly);
                if self.deliver_text(id, handle.as_ref(), APOLOGY_MESSAGE).await {
                    JobOutcome::Apology
                } else {
                    JobOutcome::DeliveryFailed
                }
            }
            Ok(reply) => match &self.media {
                None => {
                    progress.advance(JobState::DeliveringTextOnly);
                    if self.deliver_text(id, handle.as_ref(), &reply).await {
                        JobOutcome::Text
                    } else {
                        JobOutcome::DeliveryFailed
                    }
                }
                Some(media) => {
                    progress.advance(JobState::Synthesizing);
                    match media.synthesize(&reply).await {
                        Ok(synthesized) => {
                            if let Some(e) = &synthesized.video_error {
                                self.stage_failed(id, "video", e);
                            }
                            progress.advance(JobState::Delivering);
                            let text_ok = self.deliver_text(id, handle.as_ref(), &reply).await;
                            let media_ok = self
                                .deliver_artifact(id, handle.as_ref(), synthesized.artifact)
                                .await;
                            if text_ok && media_ok {
                                JobOutcome::Media
                            } else {
                                JobOutcome::DeliveryFailed
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "synthesis failed, sending text only");
                            self.stage_failed(id, "synthesis", &e);
                            progress.advance(JobState::DeliveringTextOnly);
                            let text_ok = self.deliver_text(id, handle.as_ref(), &reply).await;
                            let notice_ok = self
                                .deliver_text(id, handle.as_ref(), SYNTHESIS_FAILED_NOTICE)
                                .await;
                            if text_ok && notice_ok {
                                JobOutcome::SynthesisFailed
                            } else {
                                JobOutcome::DeliveryFailed
                            }
                        }
                    }
                }
            },
        };

        drop(reservation);
        progress.advance(JobState::Released);
        info!(%submitter, outcome = outcome.as_str(), "job finished");
        outcome
    }

    async fn generate(&self, text: &str) -> Result<String> {
        let started = Instant::now();
        let limit = self.timeouts.generation;
        let result = match timeout(limit, self.generator.complete(text)).await {
            Ok(Ok(reply)) if reply.trim().is_empty() => {
                Err(Error::Generation("empty reply".to_string()))
            }
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                stage: "generation",
                after: limit,
            }),
        };
        record_duration("generation", started);
        result
    }

    async fn deliver_text(&self, id: JobId, handle: &dyn EventHandle, text: &str) -> bool {
        let result = bounded(self.timeouts.delivery, handle.reply(text)).await;
        self.delivered(id, result)
    }

    async fn deliver_artifact(&self, id: JobId, handle: &dyn EventHandle, artifact: Artifact) -> bool {
        debug!(
            filename = %artifact.filename,
            bytes = artifact.bytes.len(),
            "delivering attachment"
        );
        let result = bounded(
            self.timeouts.delivery,
            handle.reply_with_attachment(artifact.bytes, &artifact.filename),
        )
        .await;
        self.delivered(id, result)
    }

    /// No retries: a failed delivery is logged and the reply is lost.
    fn delivered(&self, id: JobId, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "delivery failed");
                self.stage_failed(id, "delivery", &e);
                false
            }
        }
    }

    fn stage_failed(&self, id: JobId, stage: &'static str, error: &Error) {
        metrics::stage_failures().add(1, &[KeyValue::new("stage", stage)]);
        self.events.emit(EventKind::StageFailed {
            id,
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }
}

async fn bounded<F>(limit: Duration, delivery: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match timeout(limit, delivery).await {
        Ok(result) => result.map_err(|e| match e {
            Error::Delivery(_) => e,
            other => Error::Delivery(other.to_string()),
        }),
        Err(_) => Err(Error::Timeout {
            stage: "delivery",
            after: limit,
        }),
    }
}

fn record_duration(stage: &'static str, started: Instant) {
    metrics::stage_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("stage", stage)],
    );
}

/// Tracks a job's position in its state machine.
struct Progress<'a> {
    id: JobId,
    state: JobState,
    span: &'a Span,
    events: &'a EventBus,
}

impl Progress<'_> {
    fn advance(&mut self, to: JobState) {
        let from = self.state;
        if !from.can_transition_to(to) {
            warn!(from = from.as_str(), to = to.as_str(), "unexpected job state transition");
        }
        record_state_transition(self.span, from, to);
        self.events.emit(EventKind::StateTransition {
            id: self.id,
            from,
            to,
        });
        self.state = to;
    }
}
