//! Talking-head video stage: an external renderer driven by a speech track.
//!
//! The renderer is invoked as
//! `<program> <args...> --driven_audio <wav> --source_image <img> --result_dir <dir> <mode_flag>`
//! and succeeds when it exits 0 having written exactly one readable file
//! into `result_dir`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::find_program;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct VideoFile {
    video: VideoConfig,
}

/// Video toolchain configuration, loaded from TOML.
///
/// ```toml
/// [video]
/// program = "python"
/// args = ["inference.py"]
/// source_image = "assets/reference.png"
/// mode_flag = "--still"
/// required = false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub program: PathBuf,
    /// Fixed arguments placed before the per-job ones.
    #[serde(default)]
    pub args: Vec<String>,
    /// Reference image animated by the speech track.
    pub source_image: PathBuf,
    #[serde(default = "default_mode_flag")]
    pub mode_flag: String,
    /// When true, an unavailable toolchain is fatal at startup.
    #[serde(default)]
    pub required: bool,
}

fn default_mode_flag() -> String {
    "--still".to_string()
}

impl VideoConfig {
    /// Load from a TOML file with a `[video]` table.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read video config {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad video config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str::<VideoFile>(content).map(|file| file.video)
    }

    /// Why the toolchain cannot be used, if it cannot.
    pub fn unavailable_reason(&self) -> Option<String> {
        if find_program(&self.program).is_none() {
            return Some(format!(
                "video program {} not found",
                self.program.display()
            ));
        }
        if !self.source_image.is_file() {
            return Some(format!(
                "reference image {} not found",
                self.source_image.display()
            ));
        }
        None
    }
}

/// Runs the external video renderer.
#[derive(Debug, Clone)]
pub struct VideoRenderer {
    program: PathBuf,
    config: VideoConfig,
}

impl VideoRenderer {
    /// Check the toolchain once and decide whether the stage is enabled.
    ///
    /// Returns `Ok(None)` after a warning if the toolchain is missing and
    /// not required.
    ///
    /// # Errors
    /// [`Error::Config`] if the toolchain is missing and `required` is set.
    pub fn from_config(config: VideoConfig) -> Result<Option<Self>> {
        if let Some(reason) = config.unavailable_reason() {
            if config.required {
                return Err(Error::Config(reason));
            }
            warn!(%reason, "video synthesis unavailable, replies will carry audio only");
            return Ok(None);
        }
        let program = find_program(&config.program).unwrap_or_else(|| config.program.clone());
        Ok(Some(Self { program, config }))
    }

    /// Render a video from `audio` into `result_dir` and return its bytes.
    ///
    /// The child is killed if this future is dropped, so an enclosing
    /// timeout stops the renderer too. Every failure, including an
    /// unreadable output file, is a [`Error::Synthesis`].
    pub async fn render(&self, audio: &Path, result_dir: &Path) -> Result<Vec<u8>> {
        tokio::fs::create_dir_all(result_dir).await?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.config.args)
            .arg("--driven_audio")
            .arg(audio)
            .arg("--source_image")
            .arg(&self.config.source_image)
            .arg("--result_dir")
            .arg(result_dir);
        if !self.config.mode_flag.is_empty() {
            command.arg(&self.config.mode_flag);
        }

        debug!(
            program = %self.program.display(),
            result_dir = %result_dir.display(),
            "running video renderer"
        );

        let output = command
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Synthesis(format!("cannot run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Synthesis(format!(
                "video renderer exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                tail(stderr.trim(), 400)
            )));
        }

        let path = single_output(result_dir).await?;
        read_output(&path).await
    }
}

async fn read_output(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        Error::Synthesis(format!("cannot read rendered video {}: {e}", path.display()))
    })
}

/// The one regular file directly inside `dir`.
async fn single_output(dir: &Path) -> Result<PathBuf> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    match files.len() {
        1 => Ok(files.remove(0)),
        0 => Err(Error::Synthesis(format!(
            "video renderer wrote no output into {}",
            dir.display()
        ))),
        n => Err(Error::Synthesis(format!(
            "video renderer wrote {n} files into {}, expected one",
            dir.display()
        ))),
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
