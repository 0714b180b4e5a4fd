//! Speech engines.
//!
//! Engines are synchronous and may be CPU-heavy; the pipeline always calls
//! [`SpeechEngine::render`] from `spawn_blocking`, never on the runtime.
//! Abandoning a blocking task does not stop it, so every render receives a
//! [`Deadline`] and must give up, killing any child process, once it passes.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How often a running speech command is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Point in time by which a render must be finished.
///
/// Cheap to copy into `spawn_blocking` closures.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Fail if the deadline has passed.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_expired() {
            return Err(Error::Synthesis("speech deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// Renders text to an audio file.
pub trait SpeechEngine: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// File extension of the audio this engine writes.
    fn extension(&self) -> &'static str;

    /// Render `text` into `out`. Blocking; must return by `deadline`.
    fn render(&self, text: &str, out: &Path, deadline: Deadline) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Local command engine
// ---------------------------------------------------------------------------

/// A local TTS program called as `<program> <args...> -w <out.wav> <text>`
/// (the espeak / espeak-ng command line).
pub struct CommandSpeech {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Fixed arguments placed before `-w`, e.g. a script for an interpreter.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl SpeechEngine for CommandSpeech {
    fn name(&self) -> &'static str {
        "command"
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn render(&self, text: &str, out: &Path, deadline: Deadline) -> Result<()> {
        deadline.checkpoint()?;
        debug!(program = %self.program.display(), "running speech command");

        // stderr goes to a file; an unread pipe could stall the child.
        let log_path = out.with_extension("log");
        let log = std::fs::File::create(&log_path)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("-w")
            .arg(out)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log)
            .spawn()
            .map_err(|e| {
                Error::Synthesis(format!("cannot run {}: {e}", self.program.display()))
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_expired() {
                if let Err(e) = child.kill() {
                    warn!(error = %e, "failed to kill speech command");
                }
                let _ = child.wait();
                return Err(Error::Synthesis(format!(
                    "speech command {} killed at deadline",
                    self.program.display()
                )));
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "speech command exited with status {}: {}",
                status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        ensure_written(out)
    }
}

// ---------------------------------------------------------------------------
// Google Translate TTS
// ---------------------------------------------------------------------------

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// The endpoint rejects longer inputs, so text is sent in chunks.
const TRANSLATE_MAX_CHARS: usize = 100;

/// Google Translate's text-to-speech endpoint. Produces MP3.
///
/// Each chunk comes back as a self-contained MP3 stream; the streams are
/// concatenated into one file.
pub struct TranslateSpeech {
    lang: String,
    endpoint: String,
    request_timeout: Duration,
}

impl TranslateSpeech {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            endpoint: TRANSLATE_TTS_URL.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Point at a different endpoint (a mirror or a local fake).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl SpeechEngine for TranslateSpeech {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn render(&self, text: &str, out: &Path, deadline: Deadline) -> Result<()> {
        let chunks = split_for_tts(text, TRANSLATE_MAX_CHARS);
        if chunks.is_empty() {
            return Err(Error::Synthesis("nothing to speak".to_string()));
        }

        // The blocking client must not be created or dropped on the runtime.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.request_timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| Error::Synthesis(format!("cannot build http client: {e}")))?;

        let mut file = std::fs::File::create(out)?;
        let total = chunks.len().to_string();
        for (idx, chunk) in chunks.iter().enumerate() {
            deadline.checkpoint()?;
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let bytes = client
                .get(&self.endpoint)
                .timeout(self.request_timeout.min(deadline.remaining()))
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.lang.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes())
                .map_err(|e| Error::Synthesis(format!("tts request {idx} failed: {e}")))?;
            file.write_all(&bytes)?;
        }
        file.flush()?;
        drop(file);

        debug!(chunks = chunks.len(), "speech rendered");
        ensure_written(out)
    }
}

/// Split text into chunks of at most `max` characters, breaking on
/// whitespace where possible. Words longer than `max` are cut.
pub fn split_for_tts(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let cut = word
                .char_indices()
                .nth(max)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A zero exit status is not enough; the engine must have written audio.
fn ensure_written(out: &Path) -> Result<()> {
    match std::fs::metadata(out) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(Error::Synthesis(format!("{} is empty", out.display()))),
        Err(e) => Err(Error::Synthesis(format!(
            "{} was not written: {e}",
            out.display()
        ))),
    }
}
