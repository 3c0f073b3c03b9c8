use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::store::UserId;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Bot token issued by @BotFather.
    pub bot_token: String,
    /// Bot API endpoint (defaults to https://api.telegram.org). Point it
    /// at a local bot-api server to lift the hosted download limits.
    pub api_url: String,
    /// Where the state snapshot lives.
    pub state_path: PathBuf,
    /// Seconds between periodic snapshots.
    pub save_interval_secs: u64,
    /// Repost count at which the notice escalates.
    pub repost_threshold: u64,
    /// Operator user ids allowed to trigger /save.
    pub operators: Vec<UserId>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything except the bot token has a default; the token is only
    /// required for `run`.
    pub fn load() -> Result<Self> {
        let save_interval_secs = match env::var("DEJAVIEW_SAVE_INTERVAL_SECS") {
            Ok(value) => value
                .parse()
                .context("DEJAVIEW_SAVE_INTERVAL_SECS must be a number of seconds")?,
            Err(_) => DEFAULT_SAVE_INTERVAL_SECS,
        };

        let repost_threshold = match env::var("DEJAVIEW_THRESHOLD") {
            Ok(value) => value
                .parse()
                .context("DEJAVIEW_THRESHOLD must be a positive integer")?,
            Err(_) => crate::detect::DEFAULT_THRESHOLD,
        };

        let operators = env::var("DEJAVIEW_OPERATORS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<i64>().map(UserId))
            .collect::<Result<Vec<_>, _>>()
            .context("DEJAVIEW_OPERATORS must be a comma-separated list of numeric user ids")?;

        Ok(Self {
            bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| crate::telegram::client::DEFAULT_API_URL.to_string()),
            state_path: env::var("DEJAVIEW_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./dejaview.json")),
            save_interval_secs,
            repost_threshold,
            operators,
        })
    }

    /// Check that the bot token is configured.
    /// Call this before anything that talks to the Bot API.
    pub fn require_token(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!(
                "TELEGRAM_BOT_TOKEN not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }
}

const DEFAULT_SAVE_INTERVAL_SECS: u64 = 43_200;
