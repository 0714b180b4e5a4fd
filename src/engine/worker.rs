//! Queue worker: the single consumer of the work queue.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::event::{EventBus, EventKind};
use crate::model::{Job, JobOutcome};
use crate::queue::JobReceiver;
use crate::telemetry::metrics;

use super::fulfill::Fulfillment;

/// Asks a running [`QueueWorker`] to stop after its current job.
#[derive(Clone, Default)]
pub struct Shutdown {
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

/// Dequeues jobs one at a time, in arrival order, forever.
pub struct QueueWorker {
    receiver: JobReceiver,
    fulfillment: Arc<Fulfillment>,
    events: EventBus,
    shutdown: Shutdown,
}

impl QueueWorker {
    pub fn new(receiver: JobReceiver, fulfillment: Fulfillment, events: EventBus) -> Self {
        Self {
            receiver,
            fulfillment: Arc::new(fulfillment),
            events,
            shutdown: Shutdown::default(),
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run until shutdown is triggered or every queue handle is dropped
    /// and the queue has drained.
    pub async fn run(mut self) {
        info!("queue worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.notify.notified() => {
                    info!("queue worker shutting down");
                    return;
                }
                job = self.receiver.dequeue() => match job {
                    Some(job) => job,
                    None => {
                        info!("work queue closed, queue worker exiting");
                        return;
                    }
                },
            };

            self.process(job).await;
        }
    }

    /// Process one job on its own task so a panic stays inside the job.
    ///
    /// The job's reservation is dropped while the task unwinds, so the
    /// submitter is released on the panic path as well.
    async fn process(&self, job: Job) {
        let id = job.id;
        let submitter = job.submitter.clone();
        let started = Instant::now();

        let fulfillment = Arc::clone(&self.fulfillment);
        let outcome = match tokio::spawn(async move { fulfillment.run(job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %id, %submitter, error = %e, "job task failed unexpectedly");
                JobOutcome::Crashed
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::jobs_released().add(1, &[KeyValue::new("outcome", outcome.as_str())]);
        self.events.emit(EventKind::JobReleased {
            id,
            submitter,
            outcome,
            duration_ms,
        });
    }
}
