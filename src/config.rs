use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use teloxide::types::{ChatId, UserId};
use thiserror::Error;

/// Environment variable consulted when the config file carries no token.
pub const TOKEN_ENV: &str = "ROOST_BOT_TOKEN";

const DEFAULT_WEB_ADDR: &str = "127.0.0.1:8080";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{}': {source}", .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    #[serde(default)]
    owner_ids: Vec<u64>,
    /// Directory for the database and logs. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_web_addr")]
    web_addr: String,
    #[serde(default = "default_true")]
    web_enabled: bool,
    log_chat_id: Option<i64>,
}

fn default_web_addr() -> String {
    DEFAULT_WEB_ADDR.to_string()
}

fn default_true() -> bool {
    true
}

pub struct Config {
    pub telegram_bot_token: String,
    pub owner_ids: Vec<UserId>,
    pub data_dir: PathBuf,
    pub web_addr: SocketAddr,
    pub web_enabled: bool,
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load the config file, falling back to `ROOST_BOT_TOKEN` for the token.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env_token(path, std::env::var(TOKEN_ENV).ok())
    }

    pub fn load_with_env_token<P: AsRef<Path>>(
        path: P,
        env_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let telegram_bot_token = if file.telegram_bot_token.trim().is_empty() {
            env_token.map(|t| t.trim().to_string()).unwrap_or_default()
        } else {
            file.telegram_bot_token.trim().to_string()
        };
        validate_token(&telegram_bot_token)?;

        let web_addr: SocketAddr = file.web_addr.parse().map_err(|_| {
            ConfigError::Validation(format!("web_addr '{}' is not a valid socket address", file.web_addr))
        })?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            owner_ids: file.owner_ids.into_iter().map(UserId).collect(),
            data_dir,
            web_addr,
            web_enabled: file.web_enabled,
            log_chat_id: file.log_chat_id.map(ChatId),
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("roost.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Telegram tokens are formatted as `{bot_id}:{secret}` where bot_id is numeric.
fn validate_token(token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::Validation(format!(
            "telegram_bot_token is required (set it in the config file or {TOKEN_ENV})"
        )));
    }
    match token.split_once(':') {
        Some((id, secret)) if id.parse::<u64>().is_ok() && !secret.is_empty() && !secret.contains(':') => Ok(()),
        _ => Err(ConfigError::Validation(
            "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
        )),
    }
}
