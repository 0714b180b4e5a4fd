//! Reply contract back to the origin of an inbound event.
//!
//! The transport implements [`EventHandle`]; the queue and worker only ever
//! call these two methods on it.

use async_trait::async_trait;

use crate::error::Result;
use crate::queue::Admission;

/// Sent in place of a generated reply when generation fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't come up with a reply this time. Please try again later.";

/// Sent after the text reply when speech or video synthesis fails.
pub const SYNTHESIS_FAILED_NOTICE: &str = "(Voice reply unavailable this time.)";

pub const DUPLICATE_MESSAGE: &str = "You already have a message in the queue!";

pub const QUEUE_FULL_MESSAGE: &str = "Queue is full!";

/// Route back to the conversation an event came from.
#[async_trait]
pub trait EventHandle: Send + Sync {
    /// Reply with plain text.
    async fn reply(&self, text: &str) -> Result<()>;

    /// Reply with a binary attachment under the given file name.
    async fn reply_with_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<()>;
}

/// User-facing text for an admission decision.
pub fn admission_message(admission: &Admission) -> String {
    match admission {
        Admission::Accepted { position, .. } => format!("Your position in the queue: {position}"),
        Admission::Duplicate => DUPLICATE_MESSAGE.to_string(),
        Admission::Full => QUEUE_FULL_MESSAGE.to_string(),
    }
}
