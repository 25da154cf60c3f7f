use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod openai;

pub use openai::OpenAiEnricher;

/// YouTube rejects longer titles.
pub const MAX_TITLE_CHARS: usize = 100;

/// YouTube rejects descriptions over 5000 bytes.
pub const MAX_DESCRIPTION_BYTES: usize = 5000;

/// Title, description and thumbnail prompt for one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,

    pub description: String,

    #[serde(default, alias = "image_prompt", alias = "thumbnailPrompt")]
    pub thumbnail_prompt: String,
}

impl VideoMetadata {
    /// Title as sent to YouTube: angle brackets removed, at most 100 characters
    pub fn upload_title(&self) -> String {
        let cleaned: String = self
            .title
            .chars()
            .filter(|c| *c != '<' && *c != '>')
            .collect();
        let cleaned = cleaned.trim();

        let title: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
        if title.trim().is_empty() {
            "Untitled video".to_string()
        } else {
            title.trim_end().to_string()
        }
    }

    /// Description as sent to YouTube
    pub fn upload_description(&self) -> String {
        let cleaned: String = self
            .description
            .chars()
            .filter(|c| *c != '<' && *c != '>')
            .collect();

        if cleaned.len() <= MAX_DESCRIPTION_BYTES {
            return cleaned;
        }

        let mut end = MAX_DESCRIPTION_BYTES;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned[..end].to_string()
    }
}

/// Metadata derived from the file alone, used whenever enrichment is off or fails
pub fn default_metadata(filename: &str, caption: Option<&str>, link: &str) -> VideoMetadata {
    let title = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or(filename)
        .to_string();

    let description = caption
        .map(str::trim)
        .filter(|caption| !caption.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Exported video from Telegram message {}", link));

    VideoMetadata {
        title,
        description,
        thumbnail_prompt: String::new(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EnrichError {
    #[error("AI request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected AI response: {0}")]
    Malformed(String),

    #[error("could not decode image: {0}")]
    Image(#[from] base64::DecodeError),

    #[error("could not write thumbnail: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates upload metadata and thumbnails
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataEnricher: Send + Sync {
    /// Produce title, description and thumbnail prompt for a video file
    async fn describe(&self, filename: &str, caption: Option<String>) -> Result<VideoMetadata, EnrichError>;

    /// Render `prompt` into an image file at `dest`
    async fn generate_thumbnail(&self, prompt: &str, dest: &Path) -> Result<(), EnrichError>;
}
