use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use kvlock_core::LockConfig;

/// Everything `kvlock serve` needs, loaded from an optional YAML file and then
/// overridden by flags and environment variables.
///
/// ```yaml
/// server:
///   host: 0.0.0.0
///   port: 3100
/// storage: redis://127.0.0.1:6379/0
/// database: sqlite:kvlock.db
/// lock:
///   ttl_ms: 10000
///   max_attempts: 2
///   retry_delay_ms: 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `memory` or a `redis://` URL
    pub storage: String,
    /// `memory` or `sqlite:<path>`
    pub database: String,
    pub lock: LockConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// In-flight request cap
    pub max_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: "memory".to_string(),
            database: "memory".to_string(),
            lock: LockConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3100,
            max_concurrency: 1024,
        }
    }
}

impl AppConfig {
    /// Defaults, or the YAML file at `path` layered over them.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.storage.parse::<StorageBackend>()?;
        self.database.parse::<DatabaseBackend>()?;
        if self.lock.ttl_ms == 0 {
            bail!("lock.ttl_ms must be greater than 0");
        }
        if self.server.max_concurrency == 0 {
            bail!("server.max_concurrency must be greater than 0");
        }
        Ok(())
    }
}

/// Flag and env values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub storage: Option<String>,
    pub database: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

/// Where lock entries live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis(String),
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "memory" {
            Ok(StorageBackend::Memory)
        } else if s.starts_with("redis://") || s.starts_with("rediss://") {
            Ok(StorageBackend::Redis(s.to_string()))
        } else {
            bail!("unknown storage backend '{}': use 'memory' or 'redis://...'", s)
        }
    }
}

/// Where user rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    Memory,
    Sqlite(String),
}

impl FromStr for DatabaseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "memory" {
            Ok(DatabaseBackend::Memory)
        } else if let Some(path) = s.strip_prefix("sqlite:") {
            if path.is_empty() {
                bail!("sqlite database path is empty");
            }
            Ok(DatabaseBackend::Sqlite(path.to_string()))
        } else {
            bail!("unknown database '{}': use 'memory' or 'sqlite:<path>'", s)
        }
    }
}
