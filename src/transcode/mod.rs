use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("could not read ffprobe output: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("output file {0} is missing or empty")]
    MissingOutput(PathBuf),
}

/// Result of a transcode attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// A new file was written to the requested output path
    Rewritten,
    /// The input is already fine as it is
    Unchanged(String),
}

/// Removes unwanted audio tracks from a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write a copy of `input` holding only the video track and the selected
    /// audio track to `output`.
    async fn filter_audio(&self, input: &Path, output: &Path) -> Result<TranscodeOutcome, TranscodeError>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    tags: Option<ProbeTags>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    language: Option<String>,
}

/// Audio track selection made from ffprobe output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSelection {
    /// Index among audio streams (the `N` in `0:a:N`)
    pub index: usize,
    pub track_count: usize,
    pub language_matched: bool,
}

/// Pick the first audio stream tagged `language`, else the first stream
pub fn select_audio_track(probe_json: &[u8], language: &str) -> Result<Option<AudioSelection>, TranscodeError> {
    let probe: ProbeOutput = serde_json::from_slice(probe_json)?;
    let track_count = probe.streams.len();
    if track_count == 0 {
        return Ok(None);
    }

    let matched = probe.streams.iter().position(|stream| {
        stream
            .tags
            .as_ref()
            .and_then(|tags| tags.language.as_deref())
            .map(|lang| lang.eq_ignore_ascii_case(language))
            .unwrap_or(false)
    });

    Ok(Some(AudioSelection {
        index: matched.unwrap_or(0),
        track_count,
        language_matched: matched.is_some(),
    }))
}

/// ffmpeg-based audio filter
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    language: String,
}

impl FfmpegTranscoder {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            language: language.into(),
        }
    }

    /// List audio streams using ffprobe
    async fn probe_audio(&self, input: &Path) -> Result<Vec<u8>, TranscodeError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "a",
                &input.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn { tool: "ffprobe", source })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                tool: "ffprobe",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn filter_audio(&self, input: &Path, output: &Path) -> Result<TranscodeOutcome, TranscodeError> {
        let probe = self.probe_audio(input).await?;

        let selection = match select_audio_track(&probe, &self.language)? {
            Some(selection) if selection.track_count > 1 => selection,
            Some(_) => return Ok(TranscodeOutcome::Unchanged("only one audio track".to_string())),
            None => return Ok(TranscodeOutcome::Unchanged("no audio tracks".to_string())),
        };

        if selection.language_matched {
            tracing::info!(
                "Keeping audio track {} of {} (language '{}')",
                selection.index,
                selection.track_count,
                self.language
            );
        } else {
            tracing::info!(
                "No audio track tagged '{}', keeping the first of {}",
                self.language,
                selection.track_count
            );
        }

        let audio_map = format!("0:a:{}", selection.index);
        let result = Command::new(&self.ffmpeg_path)
            .args([
                "-v", "error",
                "-i", &input.to_string_lossy(),
                "-map", "0:v:0",
                "-map", &audio_map,
                "-c", "copy",
                "-y", // Output is a pre-created temp file
                &output.to_string_lossy(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn { tool: "ffmpeg", source })?;

        if !result.status.success() {
            return Err(TranscodeError::Failed {
                tool: "ffmpeg",
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(metadata) if metadata.len() > 0 => Ok(TranscodeOutcome::Rewritten),
            _ => Err(TranscodeError::MissingOutput(output.to_path_buf())),
        }
    }
}
