//! # chatq
//!
//! A fair, bounded work queue for chat-triggered generation.
//!
//! Inbound messages pass an admission gateway (one outstanding job per
//! submitter, fixed capacity), then a single worker turns each one into a
//! generated reply (rig-core), optional speech and talking-head video, and
//! delivers the result back to where it came from. Every failure degrades
//! the reply instead of aborting the job, and the submitter is always
//! released at the end.

pub mod config;
pub mod console;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod event;
pub mod llm;
pub mod model;
pub mod queue;
pub mod synthesis;
pub mod telemetry;
