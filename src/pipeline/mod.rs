//! End-to-end pipeline: link → download → transcode → enrich → upload → thumbnail.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

use crate::config::{Config, ConfigError};
use crate::enrich::{default_metadata, MetadataEnricher, OpenAiEnricher, VideoMetadata};
use crate::link::{parse_link, MessageReference, ParseError};
use crate::telegram::{media_extension, FetchError, MessageSource, TelegramClient, TelegramMessage};
use crate::transcode::{FfmpegTranscoder, TranscodeOutcome, Transcoder};
use crate::upload::{CredentialError, RetryPolicy, UploadError, VideoId, VideoUploader, YoutubeClient};
use crate::utils::format_file_size;

/// Result of an optional step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Done(T),
    Skipped(String),
}

#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("YouTube authentication failed: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("message {0} was not found")]
    MessageNotFound(MessageReference),

    #[error("message {reference} has no supported media: {note}")]
    NoMediaAttached {
        reference: MessageReference,
        note: String,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Errors that would repeat for every item, so a batch should stop
    pub fn is_systemic(&self) -> bool {
        match self {
            OrchestratorError::Config(_) | OrchestratorError::Credential(_) => true,
            OrchestratorError::Upload(UploadError::Credential(_)) => true,
            OrchestratorError::Fetch(err) => err.is_session_error(),
            _ => false,
        }
    }
}

/// Outcome of one batch item
#[derive(Debug)]
pub struct ItemReport {
    pub link: String,
    pub result: Result<VideoId, OrchestratorError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    /// Set when a systemic error stopped the batch early
    pub aborted: Option<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// Temporary files created during one run, deleted when the run ends
struct Artifacts {
    dir: PathBuf,
    files: Vec<TempPath>,
}

impl Artifacts {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Vec::new(),
        }
    }

    /// Reserve a new empty file owned by this run
    fn create(&mut self, prefix: &str, suffix: &str) -> std::io::Result<PathBuf> {
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?
            .into_temp_path();

        let owned = path.to_path_buf();
        self.files.push(path);
        Ok(owned)
    }

    /// Delete one file early once nothing downstream needs it
    fn release(&mut self, path: &Path) {
        if let Some(index) = self.files.iter().position(|file| &**file == path) {
            let file = self.files.swap_remove(index);
            remove(file);
        }
    }

    fn cleanup(mut self) {
        for file in self.files.drain(..) {
            remove(file);
        }
    }
}

fn remove(file: TempPath) {
    let path_text = file.display().to_string();
    tracing::info!("Cleaning up local file: {}", path_text);
    if let Err(e) = file.close() {
        tracing::warn!("Could not delete {}: {}", path_text, e);
    }
}

/// Sequences the collaborators for one link or a batch of links
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn MessageSource>,
    uploader: Arc<dyn VideoUploader>,
    transcoder: Option<Arc<dyn Transcoder>>,
    enricher: Option<Arc<dyn MetadataEnricher>>,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(config: Config, source: Arc<dyn MessageSource>, uploader: Arc<dyn VideoUploader>) -> Self {
        Self {
            config,
            source,
            uploader,
            transcoder: None,
            enricher: None,
            show_progress: true,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn MetadataEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Validate secrets, connect to Telegram and YouTube, and wire up the
    /// optional steps the configuration enables.
    pub async fn connect(config: Config) -> Result<Self, OrchestratorError> {
        let secrets = config.secrets.validate()?;

        let uploader = YoutubeClient::new(
            secrets.youtube.clone(),
            config.youtube.clone(),
            config.chunk_size(),
            RetryPolicy {
                max_retries: config.pipeline.max_retries,
                unit: config.retry_unit(),
            },
        )
        .map_err(|e| CredentialError::Http(e.to_string()))?;

        // Refreshing first fails fast before gigabytes are downloaded.
        uploader.authorize().await?;

        let source = TelegramClient::connect(&secrets.telegram).await?;
        let mut orchestrator = Self::new(config.clone(), Arc::new(source), Arc::new(uploader));

        if config.transcode.enabled {
            orchestrator = orchestrator.with_transcoder(Arc::new(FfmpegTranscoder::new(
                config.transcode.language.clone(),
            )));
        }

        if let Some(key) = secrets.ai_api_key.filter(|_| config.enrichment_active()) {
            match OpenAiEnricher::new(key, config.enrich.clone()) {
                Ok(enricher) => orchestrator = orchestrator.with_enricher(Arc::new(enricher)),
                Err(e) => tracing::warn!("AI enrichment disabled: {}", e),
            }
        }

        Ok(orchestrator)
    }

    /// Release the Telegram connection
    pub async fn close(&self) {
        self.source.disconnect().await;
    }

    /// Process one link end to end. Every temporary file is removed before returning.
    pub async fn run(&self, link: &str) -> Result<VideoId, OrchestratorError> {
        let reference = parse_link(link)?;
        tracing::info!("Targeting channel ID: {}, Message ID: {}", reference.channel, reference.message_id);

        let mut artifacts = Artifacts::new(self.config.work_dir());
        let result = self.process(link, &reference, &mut artifacts).await;
        artifacts.cleanup();
        result
    }

    /// Process links strictly in order with a cooldown between items.
    /// Per-item failures are logged and skipped; systemic ones stop the batch.
    pub async fn run_batch(&self, links: &[String]) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, link) in links.iter().enumerate() {
            if index > 0 && !self.config.cooldown().is_zero() {
                tracing::info!("Waiting {}s before the next item", self.config.pipeline.cooldown_secs);
                tokio::time::sleep(self.config.cooldown()).await;
            }

            tracing::info!("[{}/{}] Processing {}", index + 1, links.len(), link);
            let result = self.run(link).await;

            let systemic = match &result {
                Ok(id) => {
                    tracing::info!("[{}/{}] Uploaded as {}", index + 1, links.len(), id.watch_url());
                    None
                }
                Err(e) if e.is_systemic() => {
                    tracing::error!("[{}/{}] {} - stopping the batch", index + 1, links.len(), e);
                    Some(e.to_string())
                }
                Err(e) => {
                    tracing::error!("[{}/{}] Failed: {}", index + 1, links.len(), e);
                    None
                }
            };

            report.items.push(ItemReport {
                link: link.clone(),
                result,
            });

            if systemic.is_some() {
                report.aborted = systemic;
                break;
            }
        }

        report
    }

    async fn process(
        &self,
        link: &str,
        reference: &MessageReference,
        artifacts: &mut Artifacts,
    ) -> Result<VideoId, OrchestratorError> {
        let message = self
            .source
            .get_message(reference)
            .await?
            .ok_or(OrchestratorError::MessageNotFound(*reference))?;

        match message.media_kind() {
            Some(kind) if kind.is_supported() => {}
            Some(kind) => {
                return Err(OrchestratorError::NoMediaAttached {
                    reference: *reference,
                    note: format!("attachment is a {}, not a video or document", kind.as_str()),
                })
            }
            None => {
                return Err(OrchestratorError::NoMediaAttached {
                    reference: *reference,
                    note: "the message was found but has no media; ensure the session has access to the video"
                        .to_string(),
                })
            }
        }

        let extension = media_extension(message.filename(), None);
        let stem = format!("video_{}_{}", reference.channel, reference.message_id);
        let display_name = message
            .filename()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{}", stem, extension));

        let downloaded = artifacts.create(&format!("{}_", stem), &format!(".{}", extension))?;
        self.download(message.as_ref(), &downloaded).await?;

        let video = match self.transcode(&downloaded, &stem, &extension, artifacts).await {
            StepOutcome::Done(filtered) => {
                artifacts.release(&downloaded);
                filtered
            }
            StepOutcome::Skipped(reason) => {
                tracing::info!("Uploading original file ({})", reason);
                downloaded
            }
        };

        let caption = message.caption().map(str::to_string);
        let metadata = match self.enrich(&display_name, caption.clone()).await {
            StepOutcome::Done(metadata) => metadata,
            StepOutcome::Skipped(reason) => {
                tracing::info!("Using default metadata ({})", reason);
                default_metadata(&display_name, caption.as_deref(), link)
            }
        };

        let thumbnail = self.thumbnail(&metadata, artifacts).await;

        let bar = self.upload_bar();
        let uploaded = self.uploader.upload(&video, &metadata, &bar).await;
        bar.finish_and_clear();
        let id = uploaded?;

        match thumbnail {
            StepOutcome::Done(image) => {
                if let Err(e) = self.uploader.set_thumbnail(&id, &image).await {
                    tracing::warn!("Could not set thumbnail: {}", e);
                }
            }
            StepOutcome::Skipped(reason) => tracing::debug!("No thumbnail: {}", reason),
        }

        Ok(id)
    }

    async fn download(&self, message: &dyn TelegramMessage, dest: &Path) -> Result<u64, OrchestratorError> {
        tracing::info!("Starting download of media to {}...", dest.display());

        let bar = if self.show_progress {
            ProgressBar::new(message.declared_size().unwrap_or(0))
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
        );
        bar.set_message("Telegram download");

        let progress_bar = bar.clone();
        let on_progress = move |transferred: u64, total: u64| {
            progress_bar.set_length(total);
            progress_bar.set_position(transferred);
        };

        let result = message.download_to(dest, &on_progress).await;
        bar.finish_and_clear();

        let bytes = result?;
        tracing::info!("Download complete: {} ({})", dest.display(), format_file_size(bytes));
        Ok(bytes)
    }

    async fn transcode(
        &self,
        input: &Path,
        stem: &str,
        extension: &str,
        artifacts: &mut Artifacts,
    ) -> StepOutcome<PathBuf> {
        let Some(transcoder) = &self.transcoder else {
            return StepOutcome::Skipped("audio filtering disabled".to_string());
        };

        let output = match artifacts.create(&format!("{}_filtered_", stem), &format!(".{}", extension)) {
            Ok(path) => path,
            Err(e) => return StepOutcome::Skipped(format!("could not create output file: {}", e)),
        };

        match transcoder.filter_audio(input, &output).await {
            Ok(TranscodeOutcome::Rewritten) => {
                tracing::info!("Filtered audio tracks into {}", output.display());
                StepOutcome::Done(output)
            }
            Ok(TranscodeOutcome::Unchanged(reason)) => {
                artifacts.release(&output);
                StepOutcome::Skipped(reason)
            }
            Err(e) => {
                tracing::warn!("Audio filtering failed, keeping the original file: {}", e);
                artifacts.release(&output);
                StepOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn enrich(&self, filename: &str, caption: Option<String>) -> StepOutcome<VideoMetadata> {
        let Some(enricher) = &self.enricher else {
            return StepOutcome::Skipped("AI enrichment disabled".to_string());
        };

        match enricher.describe(filename, caption).await {
            Ok(metadata) => {
                tracing::info!("Generated title: {}", metadata.title);
                StepOutcome::Done(metadata)
            }
            Err(e) => {
                tracing::warn!("AI enrichment failed: {}", e);
                StepOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn thumbnail(&self, metadata: &VideoMetadata, artifacts: &mut Artifacts) -> StepOutcome<PathBuf> {
        let Some(enricher) = &self.enricher else {
            return StepOutcome::Skipped("AI enrichment disabled".to_string());
        };

        if metadata.thumbnail_prompt.trim().is_empty() {
            return StepOutcome::Skipped("no thumbnail prompt".to_string());
        }

        let path = match artifacts.create("thumbnail_", ".png") {
            Ok(path) => path,
            Err(e) => return StepOutcome::Skipped(format!("could not create thumbnail file: {}", e)),
        };

        match enricher.generate_thumbnail(&metadata.thumbnail_prompt, &path).await {
            Ok(()) => StepOutcome::Done(path),
            Err(e) => {
                tracing::warn!("Thumbnail generation failed: {}", e);
                artifacts.release(&path);
                StepOutcome::Skipped(e.to_string())
            }
        }
    }

    fn upload_bar(&self) -> ProgressBar {
        let bar = if self.show_progress {
            ProgressBar::new(100)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
        );
        bar.set_message("YouTube upload");
        bar
    }
}
