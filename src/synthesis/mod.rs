//! Media synthesis: speech, then optionally a talking-head video.
//!
//! Every run gets its own scratch directory that is removed when the run
//! ends, whichever way it ends. Only the bytes of the final artifact leave
//! this module.

pub mod speech;
pub mod video;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Config, SpeechBackend, Timeouts};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

pub use speech::{CommandSpeech, Deadline, SpeechEngine, TranslateSpeech};
pub use video::{VideoConfig, VideoRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    Video,
}

/// A rendered reply, ready to attach.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Result of a synthesis run that produced something deliverable.
#[derive(Debug)]
pub struct Synthesized {
    pub artifact: Artifact,
    /// Set when the video stage ran and failed; the artifact is then audio.
    pub video_error: Option<Error>,
}

/// Speech engine plus optional video renderer.
pub struct MediaPipeline {
    speech: Arc<dyn SpeechEngine>,
    video: Option<VideoRenderer>,
    speech_timeout: Duration,
    video_timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl MediaPipeline {
    pub fn new(speech: Arc<dyn SpeechEngine>, timeouts: &Timeouts) -> Self {
        Self {
            speech,
            video: None,
            speech_timeout: timeouts.speech,
            video_timeout: timeouts.video,
            scratch_root: None,
        }
    }

    pub fn with_video(mut self, video: VideoRenderer) -> Self {
        self.video = Some(video);
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Build the pipeline described by the configuration.
    ///
    /// Returns `Ok(None)` when speech is disabled.
    ///
    /// # Errors
    /// [`Error::Config`] for a missing speech program, an unreadable video
    /// config, or a required video toolchain that is not installed.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let speech: Arc<dyn SpeechEngine> = match &config.speech {
            SpeechBackend::None => {
                if config.video_config.is_some() {
                    warn!("VIDEO_CONFIG is set but speech is disabled; video needs a speech track");
                }
                return Ok(None);
            }
            SpeechBackend::Translate { lang } => Arc::new(TranslateSpeech::new(lang.clone())),
            SpeechBackend::Command { program } => {
                let Some(resolved) = find_program(program) else {
                    return Err(Error::Config(format!(
                        "speech program {} not found",
                        program.display()
                    )));
                };
                Arc::new(CommandSpeech::new(resolved))
            }
        };

        let mut pipeline = Self::new(speech, &config.timeouts);
        if let Some(path) = &config.video_config {
            let video_config = VideoConfig::load(path)?;
            if let Some(renderer) = VideoRenderer::from_config(video_config)? {
                pipeline = pipeline.with_video(renderer);
            }
        }

        info!(
            speech = pipeline.speech.name(),
            video = pipeline.video.is_some(),
            "media pipeline ready"
        );
        Ok(Some(pipeline))
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Render `text` to the richest artifact available.
    ///
    /// Speech failure fails the run. Video failure falls back to the
    /// audio artifact and is reported in [`Synthesized::video_error`].
    pub async fn synthesize(&self, text: &str) -> Result<Synthesized> {
        let scratch = self.scratch_dir()?;
        let audio_name = format!("response.{}", self.speech.extension());
        let audio_path = scratch.path().join(&audio_name);

        if let Err(e) = self.speak(text, &audio_path).await {
            record_failure("speech");
            return Err(e);
        }

        let mut video_error = None;
        if let Some(video) = &self.video {
            let started = Instant::now();
            let result_dir = scratch.path().join("video");
            let rendered = match timeout(self.video_timeout, video.render(&audio_path, &result_dir))
                .await
            {
                Ok(rendered) => rendered,
                Err(_) => Err(Error::Timeout {
                    stage: "video",
                    after: self.video_timeout,
                }),
            };
            record_duration("video", started);

            match rendered {
                Ok(bytes) => {
                    debug!(bytes = bytes.len(), "video rendered");
                    return Ok(Synthesized {
                        artifact: Artifact {
                            kind: ArtifactKind::Video,
                            filename: "response.mp4".to_string(),
                            bytes,
                        },
                        video_error: None,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "video synthesis failed, falling back to audio");
                    record_failure("video");
                    video_error = Some(e);
                }
            }
        }

        let bytes = tokio::fs::read(&audio_path).await?;
        Ok(Synthesized {
            artifact: Artifact {
                kind: ArtifactKind::Audio,
                filename: audio_name,
                bytes,
            },
            video_error,
        })
    }

    /// Run the speech engine on the blocking pool.
    ///
    /// The engine shares the wait's deadline and stops on its own once it
    /// passes.
    async fn speak(&self, text: &str, out: &Path) -> Result<()> {
        let started = Instant::now();
        let engine = Arc::clone(&self.speech);
        let text = text.to_string();
        let out = out.to_path_buf();
        let deadline = Deadline::after(self.speech_timeout);
        let task = tokio::task::spawn_blocking(move || engine.render(&text, &out, deadline));

        let timed_out = || Error::Timeout {
            stage: "speech",
            after: self.speech_timeout,
        };
        let result = match timeout(self.speech_timeout, task).await {
            Ok(Ok(Err(_))) if deadline.is_expired() => Err(timed_out()),
            Ok(Ok(rendered)) => rendered,
            Ok(Err(join)) => Err(Error::Synthesis(format!("speech engine task failed: {join}"))),
            Err(_) => Err(timed_out()),
        };
        record_duration("speech", started);
        result
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("chatq-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// Resolve a program the way a shell would: paths as given, bare names on `PATH`.
pub fn find_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn record_failure(stage: &'static str) {
    metrics::stage_failures().add(1, &[KeyValue::new("stage", stage)]);
}

fn record_duration(stage: &'static str, started: Instant) {
    metrics::stage_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("stage", stage)],
    );
}
