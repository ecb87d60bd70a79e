//! Configuration for the SmartHealth server

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use smarthealth_monitor::alerting::{QueueConfig, TelegramConfig};
use smarthealth_monitor::reminders::DEFAULT_INTERVAL_SECS;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "smarthealth.toml";

/// SmartHealth server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite database
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Telegram transport; notifications are only logged without a token
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Delivery queue sizing
    #[serde(default)]
    pub notifications: QueueConfig,

    /// Reminder polling
    #[serde(default)]
    pub reminders: ReminderConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Reminder scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Seconds between prescription scans
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("smarthealth.db")
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Resolve host and port to a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid server host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration with precedence: env vars > config file > defaults.
    /// CLI flags are applied on top by the caller.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SMARTHEALTH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SMARTHEALTH_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("SMARTHEALTH_PORT") {
            self.server.port = port.parse().context("Invalid SMARTHEALTH_PORT")?;
        }

        if let Some(path) = lookup("SMARTHEALTH_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Some(token) = lookup("SMARTHEALTH_TELEGRAM_TOKEN") {
            self.telegram.bot_token = token;
        }

        if let Some(secs) = lookup("SMARTHEALTH_REMINDER_INTERVAL_SECS") {
            self.reminders.interval_secs = secs
                .parse()
                .context("Invalid SMARTHEALTH_REMINDER_INTERVAL_SECS")?;
        }

        Ok(())
    }
}
