// Configuration loading and validation (packrat.toml).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::bot::engine::WeightOverrides;
use crate::bot::oracles::OracleId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub draft: DraftConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the WebSocket server binds on 127.0.0.1.
    pub ws_port: u16,
    pub db_path: String,
    /// Card pool file; `.csv` or `.json` by extension.
    pub pool_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Pack count when a client asks for a standard draft.
    pub default_packs: usize,
    /// Cards per pack for a standard draft.
    pub default_cards: usize,
    /// Picks beyond this many land in the sideboard at deck build.
    pub mainboard_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// How often the bot loop polls a session that made picks last tick.
    pub poll_interval_ms: u64,
    /// Backoff interval after a tick that applied zero picks.
    pub idle_interval_ms: u64,
    /// Per-oracle weight multipliers; unlisted oracles stay at 1.0.
    pub weights: HashMap<OracleId, f64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ws_port: 3017,
            db_path: "packrat.db".to_string(),
            pool_path: "pool.csv".to_string(),
        }
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            default_packs: 3,
            default_cards: 15,
            mainboard_size: 40,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            poll_interval_ms: 1000,
            idle_interval_ms: 5000,
            weights: HashMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            draft: DraftConfig::default(),
            bot: BotConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration. Order: an explicit path (must exist), then
    /// `config/packrat.toml` in the working directory, then the platform
    /// config directory, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Self::from_file(path);
        }

        let local = Path::new("config/packrat.toml");
        if local.exists() {
            return Self::from_file(local);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "packrat") {
            let path = dirs.config_dir().join("packrat.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.draft.default_packs == 0 {
            return Err(ConfigError::ValidationError {
                field: "draft.default_packs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.draft.default_cards == 0 {
            return Err(ConfigError::ValidationError {
                field: "draft.default_cards".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.draft.mainboard_size == 0 {
            return Err(ConfigError::ValidationError {
                field: "draft.mainboard_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.bot.poll_interval_ms == 0 || self.bot.idle_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                field: "bot.poll_interval_ms".into(),
                message: "intervals must be nonzero".into(),
            });
        }
        for (oracle, weight) in &self.bot.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::ValidationError {
                    field: format!("bot.weights.{}", oracle.name()),
                    message: "weights must be finite and non-negative".into(),
                });
            }
        }
        Ok(())
    }

    pub fn weight_overrides(&self) -> WeightOverrides {
        WeightOverrides::new(self.bot.weights.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.bot.poll_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.bot.idle_interval_ms)
    }
}
