//! Telegram message retrieval.
//!
//! The pipeline only talks to [`MessageSource`] and [`TelegramMessage`]; the
//! MTProto implementation lives in [`client`].

use async_trait::async_trait;
use std::path::Path;

use crate::link::MessageReference;

pub mod client;
pub mod session;

pub use client::TelegramClient;

/// Kind of media attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Document with a `video/*` mime type
    Video,
    /// Any other document (sent as file)
    Document,
    Photo,
    Other,
}

impl MediaKind {
    /// Whether the pipeline can upload this kind of attachment
    pub fn is_supported(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Document)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Photo => "photo",
            MediaKind::Other => "other",
        }
    }
}

/// Callback receiving `(bytes_transferred, total_bytes)`
pub type DownloadProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to connect to Telegram: {0}")]
    Connect(String),

    #[error("Telegram session is not authorized; generate a new session string")]
    Unauthorized,

    #[error("invalid session string: {0}")]
    InvalidSession(String),

    #[error("channel {0} is not among this account's dialogs")]
    ChannelNotFound(i64),

    #[error("message id {0} is out of range")]
    InvalidMessageId(i64),

    #[error("Telegram request failed: {0}")]
    Request(String),

    #[error("message carries no downloadable media")]
    NoMedia,

    #[error("download failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Errors that will repeat for every message in a batch
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            FetchError::Connect(_) | FetchError::Unauthorized | FetchError::InvalidSession(_)
        )
    }
}

/// A fetched message
#[async_trait]
pub trait TelegramMessage: Send + Sync {
    /// Kind of the attached media, if any
    fn media_kind(&self) -> Option<MediaKind>;

    /// Message text
    fn caption(&self) -> Option<&str>;

    /// File name declared by the sender
    fn filename(&self) -> Option<&str>;

    /// Size declared by the server
    fn declared_size(&self) -> Option<u64>;

    /// Stream the media to `dest`, returning the number of bytes written
    async fn download_to(&self, dest: &Path, progress: DownloadProgress<'_>) -> Result<u64, FetchError>;

    fn has_media(&self) -> bool {
        self.media_kind().is_some()
    }
}

/// Something that can look up channel messages
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch one message; `Ok(None)` when it does not exist
    async fn get_message(
        &self,
        reference: &MessageReference,
    ) -> Result<Option<Box<dyn TelegramMessage>>, FetchError>;

    /// Release the connection. Called once per run.
    async fn disconnect(&self) {}
}

/// Guess a file extension from a mime type or declared filename
pub fn media_extension(filename: Option<&str>, mime: Option<&str>) -> String {
    if let Some(ext) = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return ext.to_lowercase();
    }

    match mime {
        Some("video/x-matroska") => "mkv",
        Some("video/webm") => "webm",
        Some("video/quicktime") => "mov",
        Some("video/x-msvideo") => "avi",
        _ => "mp4",
    }
    .to_string()
}
