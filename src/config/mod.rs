use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resumable upload chunks must be multiples of this size.
pub const UPLOAD_CHUNK_GRANULARITY: u64 = 256 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// YouTube upload settings
    pub youtube: YoutubeSettings,

    /// Pipeline behaviour
    pub pipeline: PipelineSettings,

    /// Audio track filtering
    pub transcode: TranscodeSettings,

    /// AI metadata generation
    pub enrich: EnrichSettings,

    /// Credentials, never serialized to the settings file
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct YoutubeSettings {
    /// Video category (27 = Education)
    pub category_id: String,

    /// Tags attached to every upload
    pub tags: Vec<String>,

    /// Size of each resumable upload chunk in MiB
    pub chunk_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory for downloaded and generated files
    pub work_dir: Option<PathBuf>,

    /// Pause between batch items, in seconds
    pub cooldown_secs: u64,

    /// Upload retries before giving up
    pub max_retries: u32,

    /// Length of one backoff unit in milliseconds
    pub retry_unit_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub enabled: bool,

    /// Language tag of the audio track to keep (ISO 639-2, e.g. "eng")
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    /// Generate metadata when an API key is present
    pub enabled: bool,

    /// OpenAI-compatible API root
    pub base_url: String,

    pub text_model: String,

    pub image_model: String,

    /// Generated thumbnail dimensions
    pub image_size: String,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            category_id: "27".to_string(),
            tags: vec!["educational".to_string(), "telegram_export".to_string()],
            chunk_size_mb: 8,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: None,
            cooldown_secs: 10,
            max_retries: 5,
            retry_unit_ms: 1000,
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            language: "eng".to_string(),
        }
    }
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1792x1024".to_string(),
        }
    }
}

/// Credentials taken from the environment at startup
#[derive(Clone, Default)]
pub struct Secrets {
    pub tg_api_id: Option<String>,
    pub tg_api_hash: Option<String>,
    pub tg_session: Option<String>,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
    pub youtube_refresh_token: Option<String>,
    pub ai_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("tg_api_id", &mask(&self.tg_api_id))
            .field("tg_api_hash", &mask(&self.tg_api_hash))
            .field("tg_session", &mask(&self.tg_session))
            .field("youtube_client_id", &mask(&self.youtube_client_id))
            .field("youtube_client_secret", &mask(&self.youtube_client_secret))
            .field("youtube_refresh_token", &mask(&self.youtube_refresh_token))
            .field("ai_api_key", &mask(&self.ai_api_key))
            .finish()
    }
}

fn mask(value: &Option<String>) -> &'static str {
    if present(value).is_some() {
        "<set>"
    } else {
        "<missing>"
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Configuration problems detected at startup
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required secrets: {}", .0.join(", "))]
    MissingSecrets(Vec<&'static str>),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Validated credentials for the Telegram client
#[derive(Clone)]
pub struct TelegramCredentials {
    pub api_id: i32,
    pub api_hash: String,
    pub session: String,
}

/// Validated credentials for the YouTube token exchange
#[derive(Clone)]
pub struct YoutubeCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Everything the upload path needs, checked in one pass
#[derive(Clone)]
pub struct ValidatedSecrets {
    pub telegram: TelegramCredentials,
    pub youtube: YoutubeCredentials,
    pub ai_api_key: Option<String>,
}

impl Secrets {
    /// Check that every required secret is present, naming all that are not.
    pub fn validate(&self) -> Result<ValidatedSecrets, ConfigError> {
        let required: [(&'static str, &Option<String>); 6] = [
            ("TG_API_ID", &self.tg_api_id),
            ("TG_API_HASH", &self.tg_api_hash),
            ("TG_SESSION_STRING", &self.tg_session),
            ("YOUTUBE_CLIENT_ID", &self.youtube_client_id),
            ("YOUTUBE_CLIENT_SECRET", &self.youtube_client_secret),
            ("YOUTUBE_REFRESH_TOKEN", &self.youtube_refresh_token),
        ];

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| present(value).is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingSecrets(missing));
        }

        let telegram = self.telegram_app()?;
        let owned = |value: &Option<String>| present(value).unwrap_or_default().to_string();

        Ok(ValidatedSecrets {
            telegram: TelegramCredentials {
                session: owned(&self.tg_session),
                ..telegram
            },
            youtube: YoutubeCredentials {
                client_id: owned(&self.youtube_client_id),
                client_secret: owned(&self.youtube_client_secret),
                refresh_token: owned(&self.youtube_refresh_token),
            },
            ai_api_key: present(&self.ai_api_key).map(str::to_string),
        })
    }

    /// Telegram app id and hash, which is all interactive session generation needs.
    pub fn telegram_app(&self) -> Result<TelegramCredentials, ConfigError> {
        let missing: Vec<&'static str> = [("TG_API_ID", &self.tg_api_id), ("TG_API_HASH", &self.tg_api_hash)]
            .iter()
            .filter(|(_, value)| present(value).is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingSecrets(missing));
        }

        let raw_id = present(&self.tg_api_id).unwrap_or_default();
        let api_id = raw_id.parse::<i32>().map_err(|_| ConfigError::InvalidValue {
            name: "TG_API_ID",
            reason: format!("'{}' is not an integer", raw_id),
        })?;

        Ok(TelegramCredentials {
            api_id,
            api_hash: present(&self.tg_api_hash).unwrap_or_default().to_string(),
            session: String::new(),
        })
    }
}

impl Config {
    /// Load settings from `explicit`, the local file, or the user config dir, in that order.
    /// Falls back to defaults when no file exists; never writes anything.
    pub fn load(explicit: Option<&Path>, secrets: Secrets) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::debug!("Loading settings from {}", path.display());
                let content = fs_err::read_to_string(&path)
                    .context("Failed to read config file")?;

                serde_yaml::from_str::<Config>(&content)
                    .context("Failed to parse config file")?
            }
            Some(path) if explicit.is_some() => {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            _ => Self::default(),
        };

        config.secrets = secrets;
        config.validate()?;
        Ok(config)
    }

    /// Write the default settings to the user config directory
    pub fn init_file() -> Result<PathBuf> {
        let config_path = Self::user_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&Self::default())
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    fn discover_path() -> Option<PathBuf> {
        // Current directory first for easy testing
        let local_config = PathBuf::from("tg2yt.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        Self::user_config_path().ok()
    }

    fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tg2yt").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.youtube.chunk_size_mb == 0 {
            anyhow::bail!("youtube.chunk_size_mb must be at least 1");
        }

        if self.youtube.chunk_size_mb.checked_mul(1024 * 1024).is_none() {
            anyhow::bail!(
                "youtube.chunk_size_mb is too large ({})",
                self.youtube.chunk_size_mb
            );
        }

        if self.pipeline.retry_unit_ms == 0 {
            anyhow::bail!("pipeline.retry_unit_ms must be positive");
        }

        Ok(())
    }

    /// Upload chunk size in bytes
    pub fn chunk_size(&self) -> u64 {
        self.youtube.chunk_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.pipeline.cooldown_secs)
    }

    pub fn retry_unit(&self) -> Duration {
        Duration::from_millis(self.pipeline.retry_unit_ms)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.pipeline
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether AI enrichment should run for this configuration
    pub fn enrichment_active(&self) -> bool {
        self.enrich.enabled && present(&self.secrets.ai_api_key).is_some()
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  YouTube Category: {}", self.youtube.category_id);
        println!("  YouTube Tags: {}", self.youtube.tags.join(", "));
        println!("  Privacy: private");
        println!("  Chunk Size: {} MiB", self.youtube.chunk_size_mb);
        println!("  Work Dir: {}", self.work_dir().display());
        println!("  Batch Cooldown: {}s", self.pipeline.cooldown_secs);
        println!("  Max Upload Retries: {}", self.pipeline.max_retries);
        println!(
            "  Transcode: {} (keep '{}')",
            if self.transcode.enabled { "on" } else { "off" },
            self.transcode.language
        );
        println!(
            "  AI Enrichment: {} ({} / {})",
            if self.enrichment_active() { "on" } else { "off" },
            self.enrich.text_model,
            self.enrich.image_model
        );
        println!("Secrets:");
        println!("  TG_API_ID: {}", mask(&self.secrets.tg_api_id));
        println!("  TG_API_HASH: {}", mask(&self.secrets.tg_api_hash));
        println!("  TG_SESSION_STRING: {}", mask(&self.secrets.tg_session));
        println!("  YOUTUBE_CLIENT_ID: {}", mask(&self.secrets.youtube_client_id));
        println!("  YOUTUBE_CLIENT_SECRET: {}", mask(&self.secrets.youtube_client_secret));
        println!("  YOUTUBE_REFRESH_TOKEN: {}", mask(&self.secrets.youtube_refresh_token));
        println!("  AI_API_KEY: {}", mask(&self.secrets.ai_api_key));
    }
}
