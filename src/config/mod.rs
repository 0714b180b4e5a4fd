//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::llm::Provider;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";

#[derive(Debug)]
pub struct Config {
    pub chat_token: SecretString,
    pub generation: GenerationConfig,
    pub queue_capacity: NonZeroUsize,
    pub speech: SpeechBackend,
    /// Path to the video toolchain TOML. `None` disables the video stage.
    pub video_config: Option<PathBuf>,
    pub timeouts: Timeouts,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// The selected generation provider and its credential.
#[derive(Debug)]
pub struct GenerationConfig {
    pub provider: Provider,
    pub api_key: SecretString,
    pub model: String,
}

/// Which speech engine renders replies, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechBackend {
    /// Text replies only.
    None,
    /// Google Translate TTS over HTTP.
    Translate { lang: String },
    /// A local TTS program invoked as `<program> -w <out.wav> <text>`.
    Command { program: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Upper bounds on each stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub generation: Duration,
    pub speech: Duration,
    pub video: Duration,
    pub delivery: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            generation: Duration::from_secs(60),
            speech: Duration::from_secs(60),
            video: Duration::from_secs(600),
            delivery: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| {
            var(name).ok_or_else(|| {
                Error::Config(format!("required environment variable {name} is not set"))
            })
        };

        let chat_token = SecretString::from(required("CHAT_TOKEN")?);

        let provider: Provider = var("GENERATION_PROVIDER")
            .as_deref()
            .unwrap_or(Provider::Anthropic.as_str())
            .parse()?;
        let generation = match provider {
            Provider::OpenAi => GenerationConfig {
                provider,
                api_key: SecretString::from(required("OPENAI_API_KEY")?),
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            Provider::Anthropic => GenerationConfig {
                provider,
                api_key: SecretString::from(required("ANTHROPIC_API_KEY")?),
                model: var("ANTHROPIC_MODEL")
                    .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            },
        };

        let queue_capacity = match var("QUEUE_CAPACITY") {
            None => NonZeroUsize::new(DEFAULT_QUEUE_CAPACITY)
                .ok_or_else(|| Error::Config("default queue capacity is zero".to_string()))?,
            Some(raw) => raw.parse::<NonZeroUsize>().map_err(|_| {
                Error::Config(format!(
                    "QUEUE_CAPACITY must be a positive integer, got '{raw}'"
                ))
            })?,
        };

        let speech = match var("SPEECH_BACKEND").as_deref().unwrap_or("translate") {
            "none" | "off" => SpeechBackend::None,
            "translate" | "gtts" => SpeechBackend::Translate {
                lang: var("SPEECH_LANG").unwrap_or_else(|| "en".to_string()),
            },
            "command" => SpeechBackend::Command {
                program: PathBuf::from(required("SPEECH_COMMAND")?),
            },
            other => {
                return Err(Error::Config(format!(
                    "SPEECH_BACKEND must be one of none, translate, command; got '{other}'"
                )));
            }
        };

        let log_format = match var("LOG_FORMAT").as_deref().unwrap_or("text") {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(Error::Config(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )));
            }
        };

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            generation: seconds(&var, "GENERATION_TIMEOUT_SECS", defaults.generation)?,
            speech: seconds(&var, "SPEECH_TIMEOUT_SECS", defaults.speech)?,
            video: seconds(&var, "VIDEO_TIMEOUT_SECS", defaults.video)?,
            delivery: seconds(&var, "DELIVERY_TIMEOUT_SECS", defaults.delivery)?,
        };

        Ok(Self {
            chat_token,
            generation,
            queue_capacity,
            speech,
            video_config: var("VIDEO_CONFIG").map(PathBuf::from),
            timeouts,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }
}

fn seconds(
    var: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration> {
    match var(name) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(Error::Config(format!(
                "{name} must be a positive number of seconds, got '{raw}'"
            ))),
        },
    }
}
