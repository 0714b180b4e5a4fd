//! Metric instrument factories for chatq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"chatq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for chatq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("chatq")
}

/// Counter: admission decisions.
/// Labels: `result` ("accepted" | "duplicate" | "full").
pub fn admissions() -> Counter<u64> {
    meter()
        .u64_counter("chatq.admissions")
        .with_description("Number of admission decisions")
        .build()
}

/// Counter: jobs whose reservation was released.
/// Labels: `outcome`.
pub fn jobs_released() -> Counter<u64> {
    meter()
        .u64_counter("chatq.jobs.released")
        .with_description("Number of jobs released, by outcome")
        .build()
}

/// Counter: stage failures that triggered a degradation.
/// Labels: `stage` ("generation" | "speech" | "video" | "delivery").
pub fn stage_failures() -> Counter<u64> {
    meter()
        .u64_counter("chatq.stage.failures")
        .with_description("Number of pipeline stage failures")
        .build()
}

/// Histogram: stage duration in milliseconds.
/// Labels: `stage`.
pub fn stage_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("chatq.stage.duration_ms")
        .with_description("Pipeline stage duration in milliseconds")
        .with_unit("ms")
        .build()
}
