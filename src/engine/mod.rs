//! Job execution: the queue worker loop and the per-job pipeline.

pub mod fulfill;
pub mod worker;

pub use fulfill::Fulfillment;
pub use worker::{QueueWorker, Shutdown};
