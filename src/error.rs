//! Error types for chatq.
//!
//! Admission rejections are not errors; see [`crate::queue::Admission`].

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The generation provider failed or returned nothing usable.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Speech or video synthesis failed.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// A reply could not be delivered to the origin.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
