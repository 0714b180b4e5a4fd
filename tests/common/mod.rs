//! Stubs shared by the integration tests.

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatq::config::Timeouts;
use chatq::delivery::EventHandle;
use chatq::engine::{Fulfillment, QueueWorker};
use chatq::error::{Error, Result};
use chatq::event::{Event, EventBus, EventKind};
use chatq::llm::Generator;
use chatq::model::{InboundEvent, JobId, JobOutcome, SubmitterId};
use chatq::queue::WorkQueue;
use chatq::synthesis::{Deadline, MediaPipeline, SpeechEngine};
use tokio::sync::{Notify, broadcast};

// ---------------------------------------------------------------------------
// Event handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Text(String),
    Attachment { filename: String, bytes: Vec<u8> },
}

/// Records every reply; optionally fails them.
#[derive(Clone, Default)]
pub struct RecordingHandle {
    pub log: Arc<Mutex<Vec<Delivered>>>,
    pub fail_text: bool,
    pub fail_attachment: bool,
}

impl RecordingHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_text: true,
            fail_attachment: true,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.log.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|d| match d {
                Delivered::Text(t) => Some(t),
                Delivered::Attachment { .. } => None,
            })
            .collect()
    }

    pub fn attachments(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered()
            .into_iter()
            .filter_map(|d| match d {
                Delivered::Attachment { filename, bytes } => Some((filename, bytes)),
                Delivered::Text(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandle for RecordingHandle {
    async fn reply(&self, text: &str) -> Result<()> {
        if self.fail_text {
            return Err(Error::Delivery("channel gone".to_string()));
        }
        self.log.lock().unwrap().push(Delivered::Text(text.to_string()));
        Ok(())
    }

    async fn reply_with_attachment(&self, bytes: Vec<u8>, filename: &str) -> Result<()> {
        if self.fail_attachment {
            return Err(Error::Delivery("attachment rejected".to_string()));
        }
        self.log.lock().unwrap().push(Delivered::Attachment {
            filename: filename.to_string(),
            bytes,
        });
        Ok(())
    }
}

/// A handle for tests that never look at replies.
pub fn null_handle() -> Arc<dyn EventHandle> {
    Arc::new(RecordingHandle::new())
}

pub fn event(submitter: &str, text: &str, handle: &RecordingHandle) -> InboundEvent {
    InboundEvent::new(submitter, text, Arc::new(handle.clone()))
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub enum Script {
    Reply(String),
    Echo,
    Fail,
    Blank,
    Panic,
    /// Wait for the gate, then reply.
    Gated(Arc<Notify>, String),
    /// Never answer.
    Hang,
}

/// Generator stub that also records the prompts it saw, in order.
pub struct ScriptedGenerator {
    script: Script,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Arc::default(),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::new(Script::Reply(text.to_string()))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn complete(&self, text: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(text.to_string());
        match &self.script {
            Script::Reply(reply) => Ok(reply.clone()),
            Script::Echo => Ok(format!("echo: {text}")),
            Script::Fail => Err(Error::Generation("provider unavailable".to_string())),
            Script::Blank => Ok("   ".to_string()),
            Script::Panic => panic!("generator blew up"),
            Script::Gated(gate, reply) => {
                gate.notified().await;
                Ok(reply.clone())
            }
            Script::Hang => std::future::pending::<Result<String>>().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Speech engine
// ---------------------------------------------------------------------------

pub const FAKE_AUDIO: &[u8] = b"RIFF-fake-audio";

pub enum SpeechScript {
    Ok,
    Fail,
    Sleep(Duration),
}

pub struct StubSpeech(pub SpeechScript);

impl SpeechEngine for StubSpeech {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn render(&self, _text: &str, out: &Path, _deadline: Deadline) -> Result<()> {
        match &self.0 {
            SpeechScript::Ok => {
                std::fs::write(out, FAKE_AUDIO)?;
                Ok(())
            }
            SpeechScript::Fail => Err(Error::Synthesis("voice model missing".to_string())),
            SpeechScript::Sleep(d) => {
                std::thread::sleep(*d);
                std::fs::write(out, FAKE_AUDIO)?;
                Ok(())
            }
        }
    }
}

pub fn media(script: SpeechScript) -> MediaPipeline {
    MediaPipeline::new(Arc::new(StubSpeech(script)), &Timeouts::default())
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("capacity must be positive")
}

pub struct Harness {
    pub queue: WorkQueue,
    pub worker: QueueWorker,
    pub events: broadcast::Receiver<Event>,
}

pub fn harness(
    cap: usize,
    generator: Arc<dyn Generator>,
    media: Option<MediaPipeline>,
    timeouts: Timeouts,
) -> Harness {
    let bus = EventBus::new(1024);
    let events = bus.subscribe();
    let (queue, receiver) = WorkQueue::new(capacity(cap), bus.clone());
    let fulfillment = Fulfillment::new(generator, media, timeouts, bus.clone());
    let worker = QueueWorker::new(receiver, fulfillment, bus);
    Harness {
        queue,
        worker,
        events,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    pub id: JobId,
    pub submitter: SubmitterId,
    pub outcome: JobOutcome,
}

/// Wait for the next `n` release events, skipping everything else.
pub async fn wait_released(rx: &mut broadcast::Receiver<Event>, n: usize) -> Vec<Released> {
    let mut released = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while released.len() < n {
            let event = rx.recv().await.expect("event stream closed");
            if let EventKind::JobReleased {
                id,
                submitter,
                outcome,
                ..
            } = event.kind
            {
                released.push(Released {
                    id,
                    submitter,
                    outcome,
                });
            }
        }
    })
    .await
    .expect("timed out waiting for jobs to be released");
    released
}
