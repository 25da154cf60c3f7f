//! Chunked, resumable uploads with bounded retry.
//!
//! [`upload_with_retry`] drives any [`ChunkSession`] to completion. The
//! YouTube Data API implementation lives in [`youtube`].

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

use crate::enrich::VideoMetadata;

pub mod oauth;
pub mod youtube;

pub use oauth::{CredentialError, TokenProvider};
pub use youtube::YoutubeClient;

/// Identifier assigned by YouTube to an uploaded video
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final response of an upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    /// Video id, absent when the server answered with something unexpected
    pub id: Option<String>,
    /// Raw body, kept for diagnostics
    pub body: String,
}

/// What the server said about one chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkStatus {
    /// Fraction of bytes the server has acknowledged (0.0..=1.0)
    pub progress: Option<f64>,
    /// Present once the upload is finished
    pub response: Option<UploadResponse>,
}

/// A failed chunk attempt. Every transport error is retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self(format!("I/O error: {}", err))
    }
}

/// Why a chunk attempt failed
#[derive(thiserror::Error, Debug, Clone)]
pub enum ChunkError {
    /// Network or server trouble; the chunk is retried
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No usable access token; retrying cannot help
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("upload failed after {retries} retries: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },

    #[error("upload finished without a video id: {0}")]
    MalformedResponse(String),

    #[error("video file is empty: {0}")]
    EmptyFile(String),

    #[error("could not open video file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

#[derive(thiserror::Error, Debug)]
pub enum ThumbnailError {
    #[error("thumbnail is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("thumbnail rejected with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("could not read thumbnail: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// One resumable upload in progress
#[async_trait]
pub trait ChunkSession: Send {
    /// Send the next chunk, resuming from the server's offset after a failure
    async fn send_next_chunk(&mut self) -> Result<ChunkStatus, ChunkError>;
}

/// Receives upload progress as a fraction in `0.0..=1.0`
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);
}

impl ProgressSink for ProgressBar {
    fn report(&self, fraction: f64) {
        let length = self.length().unwrap_or(100).max(1);
        self.set_position((fraction.clamp(0.0, 1.0) * length as f64).round() as u64);
    }
}

/// Sink that ignores progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// Exponential backoff without jitter: `unit * 2^retry`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }
}

/// Drive `session` until the server returns a final response.
///
/// The retry counter spans the whole upload. Once it exceeds
/// `policy.max_retries` the upload fails without another attempt.
/// Credential failures end the upload immediately.
pub async fn upload_with_retry(
    session: &mut dyn ChunkSession,
    policy: &RetryPolicy,
    sink: &dyn ProgressSink,
) -> Result<VideoId, UploadError> {
    let mut retries = 0u32;
    let mut reported = 0.0f64;

    loop {
        match session.send_next_chunk().await {
            Ok(status) => {
                if let Some(fraction) = status.progress {
                    let fraction = fraction.clamp(0.0, 1.0);
                    if fraction > reported {
                        reported = fraction;
                        sink.report(fraction);
                        tracing::debug!("Uploaded {}%", (fraction * 100.0) as u32);
                    }
                }

                if let Some(response) = status.response {
                    return match response.id.filter(|id| !id.is_empty()) {
                        Some(id) => {
                            if reported < 1.0 {
                                sink.report(1.0);
                            }
                            Ok(VideoId(id))
                        }
                        None => Err(UploadError::MalformedResponse(response.body)),
                    };
                }
            }
            Err(ChunkError::Credential(err)) => {
                tracing::error!("Upload stopped, credentials rejected: {}", err);
                return Err(UploadError::Credential(err));
            }
            Err(ChunkError::Transport(err)) => {
                retries += 1;
                if retries > policy.max_retries {
                    tracing::error!("Maximum retries reached, upload failed: {}", err);
                    return Err(UploadError::RetriesExhausted {
                        retries: policy.max_retries,
                        last_error: err.to_string(),
                    });
                }

                let delay = policy.delay_for(retries);
                tracing::warn!(
                    "Retriable error occurred: {}. Retrying in {:?} ({}/{})",
                    err,
                    delay,
                    retries,
                    policy.max_retries
                );
                sleep(delay).await;
            }
        }
    }
}

/// Upload seam used by the orchestrator
#[async_trait]
pub trait VideoUploader: Send + Sync {
    /// Check credentials before any work is done
    async fn authorize(&self) -> Result<(), CredentialError> {
        Ok(())
    }

    /// Upload the file at `path` as a new video
    async fn upload(
        &self,
        path: &Path,
        metadata: &VideoMetadata,
        progress: &dyn ProgressSink,
    ) -> Result<VideoId, UploadError>;

    /// Attach a custom thumbnail to an uploaded video
    async fn set_thumbnail(&self, video: &VideoId, image: &Path) -> Result<(), ThumbnailError>;
}
