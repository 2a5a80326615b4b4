//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Telegram transport settings. Absent when no bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids allowed to talk to the bot. `*` = everyone.
    pub allowed_users: Vec<String>,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// `None` runs the bot on the local CLI channel.
    pub telegram: Option<TelegramConfig>,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Simulated typing pause before flow replies.
    pub reply_delay: Duration,
    /// Directory for daily-rolling log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            db_path: PathBuf::from("./data/care-bot.db"),
            reply_delay: Duration::from_millis(500),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let telegram = get("TELEGRAM_BOT_TOKEN").map(|token| {
            let allowed_users = parse_list(&get("TELEGRAM_ALLOWED_USERS").unwrap_or("*".into()));
            TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users,
            }
        });

        let db_path = get("CARE_BOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let reply_delay = match get("CARE_BOT_REPLY_DELAY_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: "CARE_BOT_REPLY_DELAY_MS".into(),
                    message: format!("{raw:?} is not a number of milliseconds: {e}"),
                })?;
                Duration::from_millis(ms)
            }
            None => defaults.reply_delay,
        };

        let log_dir = get("CARE_BOT_LOG_DIR").map(PathBuf::from);

        Ok(Self {
            telegram,
            db_path,
            reply_delay,
            log_dir,
        })
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
