//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `irrigo.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use irrigo_app::engine::EngineConfig;
use irrigo_domain::time::WallClock;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Scheduler and driver timing.
    pub engine: EngineSection,
    /// Virtual relay board.
    pub driver: DriverConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Engine timing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Period of the scheduler tick.
    pub tick_interval_ms: u64,
    /// Upper bound for a single relay operation.
    pub driver_timeout_ms: u64,
    /// Offset of the controller's wall clock, `+HH:MM`. System local time when absent.
    pub utc_offset: Option<String>,
}

/// Virtual relay board settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Simulated latency of every relay operation.
    pub latency_ms: u64,
}

impl Config {
    /// Load configuration from `irrigo.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("irrigo.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("IRRIGO_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("IRRIGO_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("IRRIGO_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("IRRIGO_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("IRRIGO_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.engine.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.tick_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.engine.driver_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "engine.driver_timeout_ms must be non-zero".to_string(),
            ));
        }
        self.wall_clock()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_interval_ms)
    }

    #[must_use]
    pub fn driver_latency(&self) -> Duration {
        Duration::from_millis(self.driver.latency_ms)
    }

    /// Clock schedules are evaluated against.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a malformed `utc_offset`.
    pub fn wall_clock(&self) -> Result<WallClock, ConfigError> {
        match self.engine.utc_offset.as_deref() {
            None => Ok(WallClock::System),
            Some(raw) => parse_offset(raw).map(WallClock::Fixed).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "engine.utc_offset {raw:?} is not of the form +HH:MM"
                ))
            }),
        }
    }

    /// Runtime knobs handed to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a malformed `utc_offset`.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(EngineConfig {
            driver_timeout: Duration::from_millis(self.engine.driver_timeout_ms),
            wall_clock: self.wall_clock()?,
        })
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:irrigo.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "irrigod=info,irrigo_app=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            driver_timeout_ms: 2000,
            utc_offset: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
