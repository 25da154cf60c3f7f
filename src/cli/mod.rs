use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Secrets;

#[derive(Parser)]
#[command(
    name = "tg2yt",
    about = "Copy videos from private Telegram channels to YouTube",
    version,
    long_about = "Downloads the video attached to a Telegram channel message (https://t.me/c/<channel>/<message>), optionally filters its audio tracks and generates metadata with an AI model, then uploads it to YouTube as a private video."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Settings file (defaults to ./tg2yt.yaml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub secrets: SecretArgs,
}

/// Credentials, normally supplied through the environment
#[derive(Args, Clone, Default)]
pub struct SecretArgs {
    #[arg(long, env = "TG_API_ID", hide_env_values = true, global = true)]
    pub tg_api_id: Option<String>,

    #[arg(long, env = "TG_API_HASH", hide_env_values = true, global = true)]
    pub tg_api_hash: Option<String>,

    #[arg(long, env = "TG_SESSION_STRING", hide_env_values = true, global = true)]
    pub tg_session_string: Option<String>,

    #[arg(long, env = "YOUTUBE_CLIENT_ID", hide_env_values = true, global = true)]
    pub youtube_client_id: Option<String>,

    #[arg(long, env = "YOUTUBE_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub youtube_client_secret: Option<String>,

    #[arg(long, env = "YOUTUBE_REFRESH_TOKEN", hide_env_values = true, global = true)]
    pub youtube_refresh_token: Option<String>,

    /// Key for the OpenAI-compatible API; enables AI titles and thumbnails
    #[arg(long, env = "AI_API_KEY", hide_env_values = true, global = true)]
    pub ai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true, hide = true)]
    pub openai_api_key: Option<String>,
}

impl From<SecretArgs> for Secrets {
    fn from(args: SecretArgs) -> Self {
        Secrets {
            tg_api_id: args.tg_api_id,
            tg_api_hash: args.tg_api_hash,
            tg_session: args.tg_session_string,
            youtube_client_id: args.youtube_client_id,
            youtube_client_secret: args.youtube_client_secret,
            youtube_refresh_token: args.youtube_refresh_token,
            ai_api_key: args.ai_api_key.or(args.openai_api_key),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy one video, or several in order when more than one link is given
    Upload {
        /// Message links like https://t.me/c/1234567890/555 (comma or newline separated lists accepted)
        #[arg(value_name = "LINK", required = true, num_args = 1..)]
        links: Vec<String>,

        /// Seconds to wait between batch items (overrides the settings file)
        #[arg(long, value_name = "SECS")]
        cooldown: Option<u64>,
    },

    /// Log in to Telegram interactively and print a TG_SESSION_STRING
    Session,

    /// Show or initialize the settings file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default settings file to the user config dir
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },

    /// Check that the external tools used by optional steps are installed
    Doctor,
}
