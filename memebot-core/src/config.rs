use crate::error::ConfigError;
use crate::types::is_valid_subreddit_name;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "MEMEBOT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "memebot.toml";

/// Process-wide settings, built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub command_prefix: String,
    pub max_memes_per_request: usize,
    pub default_count: usize,
    pub default_subreddits: Vec<String>,
    pub supported_image_formats: Vec<String>,
    pub image_host_patterns: Vec<String>,
    pub fetch_over_batch_factor: usize,
    pub backfill_keyword_search: bool,
    pub inter_call_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub embed_send_delay_ms: u64,
    pub user_agent: String,

    #[serde(skip)]
    pub discord_token: Option<String>,
    #[serde(skip)]
    pub reddit_client_id: Option<String>,
    #[serde(skip)]
    pub reddit_client_secret: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            max_memes_per_request: 5,
            default_count: 3,
            default_subreddits: to_strings(&[
                "memes",
                "dankmemes",
                "funny",
                "me_irl",
                "wholesomememes",
            ]),
            supported_image_formats: to_strings(&["jpg", "jpeg", "png", "gif", "webp"]),
            image_host_patterns: to_strings(&[
                "i.imgur.com",
                "imgur.com",
                "media.giphy.com",
                "gfycat.com",
                "reddit.com/media",
                "preview.redd.it",
                "i.redd.it",
                "/image/",
                "/img/",
                "/media/",
            ]),
            fetch_over_batch_factor: 2,
            backfill_keyword_search: true,
            inter_call_delay_ms: 500,
            request_timeout_ms: 10_000,
            embed_send_delay_ms: 1_000,
            user_agent: "MemeFetcherBot/1.0".to_string(),
            discord_token: None,
            reddit_client_id: None,
            reddit_client_secret: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Trims an env value; blank counts as unset.
pub fn clean_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl BotConfig {
    /// Loads `.env`, the optional TOML file and environment overrides, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let mut config = match clean_value(std::env::var(CONFIG_PATH_ENV).ok()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Unreadable {
                path: path.display().to_string(),
                source: e,
            },
        })?;
        info!("Loading configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| clean_value(lookup(key));

        self.discord_token = get("DISCORD_TOKEN");
        self.reddit_client_id = get("REDDIT_CLIENT_ID");
        self.reddit_client_secret = get("REDDIT_CLIENT_SECRET");

        if let Some(prefix) = get("MEMEBOT_PREFIX") {
            self.command_prefix = prefix;
        }
        if let Some(max) = get("MEMEBOT_MAX_MEMES") {
            self.max_memes_per_request =
                max.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "MEMEBOT_MAX_MEMES".to_string(),
                    value: max.clone(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var_name, value) in [
            ("DISCORD_TOKEN", &self.discord_token),
            ("REDDIT_CLIENT_ID", &self.reddit_client_id),
            ("REDDIT_CLIENT_SECRET", &self.reddit_client_secret),
        ] {
            if value.is_none() {
                return Err(ConfigError::MissingEnvironmentVariable {
                    var_name: var_name.to_string(),
                });
            }
        }
        self.validate_settings()
    }

    /// Checks everything except credentials.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        };

        if self.command_prefix.trim().is_empty() {
            return Err(invalid("command_prefix", self.command_prefix.clone()));
        }
        if self.max_memes_per_request == 0 {
            return Err(invalid("max_memes_per_request", "0".to_string()));
        }
        if self.default_count == 0 {
            return Err(invalid("default_count", "0".to_string()));
        }
        if self.fetch_over_batch_factor == 0 {
            return Err(invalid("fetch_over_batch_factor", "0".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "0".to_string()));
        }
        if self.default_subreddits.iter().all(|s| s.trim().is_empty()) {
            return Err(invalid("default_subreddits", "[]".to_string()));
        }
        if let Some(bad) = self
            .subreddits()
            .into_iter()
            .find(|s| !is_valid_subreddit_name(s))
        {
            return Err(invalid("default_subreddits", bad));
        }
        Ok(())
    }

    /// Default subreddits with blanks dropped and whitespace trimmed.
    pub fn subreddits(&self) -> Vec<String> {
        self.default_subreddits
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn embed_send_delay(&self) -> Duration {
        Duration::from_millis(self.embed_send_delay_ms)
    }
}
