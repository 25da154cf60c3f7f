use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use super::oauth::TOKEN_ENDPOINT;
use super::{
    upload_with_retry, ChunkError, ChunkSession, ChunkStatus, CredentialError, ProgressSink,
    RetryPolicy, ThumbnailError, TokenProvider, TransportError, UploadError, UploadResponse,
    VideoId, VideoUploader,
};
use crate::config::{YoutubeCredentials, YoutubeSettings, UPLOAD_CHUNK_GRANULARITY};
use crate::enrich::VideoMetadata;

const API_ROOT: &str = "https://www.googleapis.com";
const UPLOAD_PATH: &str = "/upload/youtube/v3/videos";
const THUMBNAIL_PATH: &str = "/upload/youtube/v3/thumbnails/set";

/// Every upload is private; publishing is a manual step.
const PRIVACY_STATUS: &str = "private";

/// YouTube refuses thumbnails over 2 MiB.
pub const MAX_THUMBNAIL_BYTES: u64 = 2 * 1024 * 1024;

/// Where the OAuth and upload requests go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub token: String,
    pub upload: String,
    pub thumbnail: String,
}

impl ApiEndpoints {
    /// All endpoints under one root, as a local test server serves them
    pub fn at(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            token: format!("{}/token", root),
            upload: format!("{}{}", root, UPLOAD_PATH),
            thumbnail: format!("{}{}", root, THUMBNAIL_PATH),
        }
    }
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            token: TOKEN_ENDPOINT.to_string(),
            upload: format!("{}{}", API_ROOT, UPLOAD_PATH),
            thumbnail: format!("{}{}", API_ROOT, THUMBNAIL_PATH),
        }
    }
}

/// YouTube Data API v3 client
pub struct YoutubeClient {
    http: Client,
    tokens: Arc<TokenProvider>,
    endpoints: ApiEndpoints,
    settings: YoutubeSettings,
    chunk_size: u64,
    policy: RetryPolicy,
}

impl YoutubeClient {
    pub fn new(
        credentials: YoutubeCredentials,
        settings: YoutubeSettings,
        chunk_size: u64,
        policy: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        Self::with_endpoints(credentials, settings, chunk_size, policy, ApiEndpoints::default())
    }

    pub fn with_endpoints(
        credentials: YoutubeCredentials,
        settings: YoutubeSettings,
        chunk_size: u64,
        policy: RetryPolicy,
        endpoints: ApiEndpoints,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()?;

        let tokens = Arc::new(
            TokenProvider::new(http.clone(), credentials).with_endpoint(endpoints.token.clone()),
        );

        Ok(Self {
            http,
            tokens,
            endpoints,
            settings,
            chunk_size: align_chunk_size(chunk_size),
            policy,
        })
    }

    /// Request body for the initiation call
    fn video_resource(&self, metadata: &VideoMetadata) -> Value {
        json!({
            "snippet": {
                "title": metadata.upload_title(),
                "description": metadata.upload_description(),
                "tags": self.settings.tags,
                "categoryId": self.settings.category_id,
            },
            "status": {
                "privacyStatus": PRIVACY_STATUS,
                "selfDeclaredMadeForKids": false,
            }
        })
    }
}

#[async_trait]
impl VideoUploader for YoutubeClient {
    async fn authorize(&self) -> Result<(), CredentialError> {
        self.tokens.access_token().await.map(|_| ())
    }

    async fn upload(
        &self,
        path: &Path,
        metadata: &VideoMetadata,
        progress: &dyn ProgressSink,
    ) -> Result<VideoId, UploadError> {
        let file = File::open(path).await?;
        let total = file.metadata().await?.len();
        if total == 0 {
            return Err(UploadError::EmptyFile(path.display().to_string()));
        }

        tracing::info!("Starting upload for: {}", metadata.upload_title());

        // The session owns the file handle; it is closed when the session drops.
        let mut session = ResumableUpload {
            http: &self.http,
            tokens: &self.tokens,
            endpoint: &self.endpoints.upload,
            file,
            total,
            chunk_size: self.chunk_size,
            content_type: video_content_type(path),
            resource: self.video_resource(metadata),
            session_uri: None,
            offset: 0,
            needs_resync: false,
        };

        let id = upload_with_retry(&mut session, &self.policy, progress).await?;
        tracing::info!("Video upload complete! YouTube ID: {}", id);
        tracing::info!("Link: {}", id.watch_url());
        Ok(id)
    }

    async fn set_thumbnail(&self, video: &VideoId, image: &Path) -> Result<(), ThumbnailError> {
        let size = tokio::fs::metadata(image).await?.len();
        if size > MAX_THUMBNAIL_BYTES {
            return Err(ThumbnailError::TooLarge {
                size,
                limit: MAX_THUMBNAIL_BYTES,
            });
        }

        let bytes = tokio::fs::read(image).await?;
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(&self.endpoints.thumbnail)
            .query(&[("videoId", video.0.as_str())])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, image_content_type(image))
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThumbnailError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        tracing::info!("Thumbnail set for {}", video);
        Ok(())
    }
}

/// State of one resumable upload session
struct ResumableUpload<'a> {
    http: &'a Client,
    tokens: &'a TokenProvider,
    endpoint: &'a str,
    file: File,
    total: u64,
    chunk_size: u64,
    content_type: &'static str,
    resource: Value,
    session_uri: Option<String>,
    offset: u64,
    needs_resync: bool,
}

impl<'a> ResumableUpload<'a> {
    /// Open the session; the Location header is the URI for all chunks
    async fn initiate(&self, token: &str) -> Result<String, TransportError> {
        tracing::debug!("Initiating resumable upload ({} bytes)", self.total);

        let response = self
            .http
            .post(self.endpoint)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", self.content_type)
            .header("X-Upload-Content-Length", self.total.to_string())
            .json(&self.resource)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::new(format!(
                "upload initiation failed with {}: {}",
                status, body
            )));
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TransportError::new("no Location header in upload initiation response"))
    }

    /// Ask the server how much it has after a failed chunk
    async fn resync(&mut self, uri: &str, token: &str) -> Result<Option<ChunkStatus>, TransportError> {
        let response = self
            .http
            .put(uri)
            .bearer_auth(token)
            .header(header::CONTENT_RANGE, format!("bytes */{}", self.total))
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::warn!("Upload session expired, starting a new one");
                self.session_uri = None;
                self.offset = 0;
                Err(TransportError::new("upload session expired"))
            }
            _ => {
                let status = self.interpret(response).await?;
                tracing::debug!("Resuming upload at byte {}", self.offset);
                Ok(status.response.is_some().then_some(status))
            }
        }
    }

    async fn put_chunk(&mut self, uri: &str, token: &str) -> Result<ChunkStatus, TransportError> {
        let remaining = self.total.saturating_sub(self.offset);
        let length = remaining.min(self.chunk_size);

        self.file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity(length as usize);
        (&mut self.file).take(length).read_to_end(&mut chunk).await?;
        if (chunk.len() as u64) != length {
            return Err(TransportError::new("video file shrank during upload"));
        }

        let content_range = if length == 0 {
            format!("bytes */{}", self.total)
        } else {
            format!("bytes {}-{}/{}", self.offset, self.offset + length - 1, self.total)
        };

        let response = self
            .http
            .put(uri)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, self.content_type)
            .header(header::CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await?;

        self.interpret(response).await
    }

    /// Map a server response to chunk status, advancing the offset on 308
    async fn interpret(&mut self, response: Response) -> Result<ChunkStatus, TransportError> {
        let status = response.status();

        if status.as_u16() == 308 {
            let acknowledged = response
                .headers()
                .get(header::RANGE)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_range_end)
                .map(|end| end + 1)
                .unwrap_or(0);

            self.offset = acknowledged.min(self.total);
            return Ok(ChunkStatus {
                progress: Some(self.offset as f64 / self.total as f64),
                response: None,
            });
        }

        let body = response.text().await?;
        if status.is_success() {
            let id = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value["id"].as_str().map(str::to_string));

            return Ok(ChunkStatus {
                progress: Some(1.0),
                response: Some(UploadResponse { id, body }),
            });
        }

        Err(TransportError::new(format!("server returned {}: {}", status, body.trim())))
    }

    async fn attempt(&mut self) -> Result<ChunkStatus, ChunkError> {
        let token = self.tokens.access_token().await?;

        let uri = match &self.session_uri {
            Some(uri) => uri.clone(),
            None => {
                let uri = self.initiate(&token).await?;
                self.session_uri = Some(uri.clone());
                self.offset = 0;
                self.needs_resync = false;
                uri
            }
        };

        if self.needs_resync {
            if let Some(finished) = self.resync(&uri, &token).await? {
                return Ok(finished);
            }
            self.needs_resync = false;
        }

        Ok(self.put_chunk(&uri, &token).await?)
    }
}

#[async_trait]
impl<'a> ChunkSession for ResumableUpload<'a> {
    async fn send_next_chunk(&mut self) -> Result<ChunkStatus, ChunkError> {
        let result = self.attempt().await;
        if matches!(result, Err(ChunkError::Transport(_))) && self.session_uri.is_some() {
            self.needs_resync = true;
        }
        result
    }
}

/// Parse the end offset from a `Range: bytes=0-1234` header
fn parse_range_end(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes=")?
        .split('-')
        .nth(1)?
        .trim()
        .parse()
        .ok()
}

/// Round down to the 256 KiB granularity required for non-final chunks
fn align_chunk_size(requested: u64) -> u64 {
    (requested / UPLOAD_CHUNK_GRANULARITY).max(1) * UPLOAD_CHUNK_GRANULARITY
}

fn video_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        _ => "video/*",
    }
}

fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}
