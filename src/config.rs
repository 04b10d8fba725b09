//! Application-level configuration loading: player palette, queue, presence and
//! rate-limit tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BINGO_BATTLES_CONFIG_PATH";

/// Join-queue tuning.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Entries a single session queue can hold.
    pub max_size: usize,
    /// Age after which pending entries expire and settled ones are deleted.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "max_wait_secs")]
    pub max_wait: Duration,
    /// Period of the background cleanup sweep.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "cleanup_interval_secs")]
    pub cleanup_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_wait: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Presence tuning.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// A client silent for longer than this is considered gone.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "timeout_secs")]
    pub timeout: Duration,
    /// Period of the stale-presence sweep.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "sweep_interval_secs")]
    pub sweep_interval: Duration,
    /// How long a new socket may stay silent before its `track` frame.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "identify_timeout_secs")]
    pub identify_timeout: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            identify_timeout: Duration::from_secs(10),
        }
    }
}

/// Sliding-window limit applied to join attempts per user.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "window_secs")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Defaults applied when a create request omits settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub default_board_size: usize,
    pub default_max_players: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_board_size: 5,
            default_max_players: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    colors: Vec<String>,
    pub queue: QueueConfig,
    pub presence: PresenceConfig,
    pub join_rate_limit: RateLimitConfig,
    pub session: SessionDefaults,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        colors = app_config.colors.len(),
                        queue_max_size = app_config.queue.max_size,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; colors are lowercased and an empty palette keeps the default one.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let mut config = serde_json::from_str::<Self>(contents)?;
        let mut colors = Vec::with_capacity(config.colors.len());
        for color in config.colors.drain(..) {
            let color = color.trim().to_ascii_lowercase();
            if !color.is_empty() && !colors.contains(&color) {
                colors.push(color);
            }
        }
        config.colors = if colors.is_empty() {
            default_colors()
        } else {
            colors
        };
        Ok(config)
    }

    /// Player palette in preference order.
    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    /// Return the first palette color not already listed in `used`.
    ///
    /// `None` once every palette entry is taken.
    pub fn first_unused_color(&self, used: &[String]) -> Option<String> {
        self.colors
            .iter()
            .find(|candidate| used.iter().all(|existing| existing != *candidate))
            .cloned()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            colors: default_colors(),
            queue: QueueConfig::default(),
            presence: PresenceConfig::default(),
            join_rate_limit: RateLimitConfig::default(),
            session: SessionDefaults::default(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in palette shipped with the binary, one color per possible seat.
fn default_colors() -> Vec<String> {
    [
        "blue", "red", "green", "yellow", "purple", "orange", "pink", "cyan", "teal", "lime",
        "indigo", "amber",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
