//! Admission gateway: duplicate and capacity checks, then enqueue.

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{InboundEvent, Job, JobId};
use crate::telemetry::metrics;

/// What happened when an event was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued. `position` is the queue length right after enqueueing.
    Accepted { id: JobId, position: usize },
    /// The submitter already has a job queued or in flight.
    Duplicate,
    /// The queue is at capacity.
    Full,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Admission::Accepted { .. } => "accepted",
            Admission::Duplicate => "duplicate",
            Admission::Full => "full",
        }
    }
}

impl super::WorkQueue {
    /// Admit an inbound event, or say why not.
    ///
    /// Never waits on the worker. The whole check-then-act sequence runs
    /// inside the registry's critical section, so two events from the same
    /// submitter cannot both pass the duplicate check. Rejections leave
    /// the queue and registry untouched.
    ///
    /// # Errors
    /// Returns an error only if the worker side of the queue is gone.
    pub fn submit(&self, event: InboundEvent) -> Result<Admission> {
        let InboundEvent {
            submitter,
            text,
            handle,
        } = event;

        let admission = {
            let mut held = self.registry.lock();

            if held.contains(&submitter) {
                Admission::Duplicate
            } else {
                match self.tx.try_reserve() {
                    Err(TrySendError::Full(())) => Admission::Full,
                    Err(TrySendError::Closed(())) => {
                        return Err(Error::Other("work queue is closed".to_string()));
                    }
                    Ok(permit) => {
                        let Some(reservation) = self.registry.reserve(&mut held, &submitter)
                        else {
                            // Checked above under the same lock.
                            return Ok(Admission::Duplicate);
                        };
                        let id = JobId::new();
                        // The reserved slot already counts toward the length.
                        let position = self.len();
                        // Published before the job is visible to the worker,
                        // so it precedes every event about this job.
                        self.events.emit(EventKind::JobAdmitted {
                            id,
                            submitter: submitter.clone(),
                            position,
                        });
                        permit.send(Job {
                            id,
                            submitter: submitter.clone(),
                            text,
                            handle,
                            enqueued_at: Utc::now(),
                            reservation,
                        });
                        Admission::Accepted { id, position }
                    }
                }
            }
        };

        metrics::admissions().add(1, &[KeyValue::new("result", admission.as_str())]);

        match admission {
            Admission::Accepted { id, position } => {
                info!(job_id = %id, %submitter, position, "job admitted");
            }
            rejected => {
                debug!(%submitter, reason = rejected.as_str(), "admission rejected");
                self.events.emit(EventKind::JobRejected {
                    submitter,
                    reason: rejected.as_str().to_string(),
                });
            }
        }

        Ok(admission)
    }
}
