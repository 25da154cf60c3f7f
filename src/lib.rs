//! tg2yt - copy videos from private Telegram channels to YouTube
//!
//! This library resolves Telegram channel message links, downloads the attached
//! video, optionally filters audio tracks and generates metadata, and uploads the
//! result through the YouTube resumable upload protocol with bounded retries.

pub mod cli;
pub mod config;
pub mod enrich;
pub mod link;
pub mod pipeline;
pub mod telegram;
pub mod transcode;
pub mod upload;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use link::{parse_link, MessageReference};
pub use pipeline::{BatchReport, Orchestrator, OrchestratorError};
pub use upload::VideoId;

/// Result type used by the binary and CLI helpers
pub type Result<T> = anyhow::Result<T>;
