//! Line-oriented console transport.
//!
//! Stands in for a chat platform: each input line `name: message` is one
//! inbound event from submitter `name`. Replies are written to the output
//! as `[@name] text`; attachments are saved to an outbox directory.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::delivery::{EventHandle, admission_message};
use crate::error::{Error, Result};
use crate::model::{InboundEvent, SubmitterId};
use crate::queue::WorkQueue;

/// Output shared by every handle so replies never interleave mid-line.
pub type SharedOutput<W> = Arc<Mutex<W>>;

/// Reply route for one console message.
pub struct ConsoleHandle<W> {
    submitter: SubmitterId,
    output: SharedOutput<W>,
    outbox: PathBuf,
}

impl<W> ConsoleHandle<W> {
    pub fn new(submitter: SubmitterId, output: SharedOutput<W>, outbox: impl Into<PathBuf>) -> Self {
        Self {
            submitter,
            output,
            outbox: outbox.into(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleHandle<W> {
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut out = self.output.lock().await;
        out.write_all(format!("[@{}] {line}\n", self.submitter).as_bytes())
            .await
            .map_err(|e| Error::Delivery(format!("console write failed: {e}")))?;
        out.flush()
            .await
            .map_err(|e| Error::Delivery(format!("console flush failed: {e}")))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> EventHandle for ConsoleHandle<W> {
    async fn reply(&self, text: &str) -> Result<()> {
        self.write_line(text).await
    }

    async fn reply_with_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.outbox).await?;
        let name = format!(
            "{}-{}-{}",
            sanitize(&self.submitter.0),
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"),
            sanitize(filename)
        );
        let path = self.outbox.join(name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::Delivery(format!("cannot save {}: {e}", path.display())))?;
        self.write_line(&format!("attachment: {}", path.display()))
            .await
    }
}

/// Parse `name: message`. Blank lines, `#` comments and lines without a
/// message are ignored.
pub fn parse_line(line: &str) -> Option<(SubmitterId, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (name, text) = line.split_once(':')?;
    let (name, text) = (name.trim(), text.trim());
    if name.is_empty() || text.is_empty() {
        return None;
    }
    Some((SubmitterId::from(name), text.to_string()))
}

/// Feed every line of `input` through the admission gateway until EOF,
/// replying with the admission decision.
pub async fn run_console<R, W>(
    input: R,
    output: SharedOutput<W>,
    queue: WorkQueue,
    outbox: PathBuf,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some((submitter, text)) = parse_line(&line) else {
            if !line.trim().is_empty() && !line.trim_start().starts_with('#') {
                warn!(line = %line, "ignoring console line without 'name: message'");
            }
            continue;
        };

        let handle = Arc::new(ConsoleHandle::new(
            submitter.clone(),
            Arc::clone(&output),
            outbox.clone(),
        ));
        let admission = queue.submit(InboundEvent::new(submitter, text, handle.clone()))?;
        if let Err(e) = handle.reply(&admission_message(&admission)).await {
            error!(error = %e, "failed to send admission reply");
        }
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
