use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::messaging::OverflowPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub messaging: MessagingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            messaging: MessagingConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where messages are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    SqliteInMemory,
    Sqlite(PathBuf),
}

impl StoreBackend {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Memory,
            ":memory:" => Self::SqliteInMemory,
            path => Self::Sqlite(PathBuf::from(path)),
        }
    }
}

/// Notification queue and stream tuning.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub store: StoreBackend,
    /// `None` keeps the queue unbounded.
    pub queue_capacity: Option<usize>,
    pub overflow: OverflowPolicy,
    pub stream_buffer: usize,
    pub keep_alive: Option<Duration>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            queue_capacity: None,
            overflow: OverflowPolicy::DropOldest,
            stream_buffer: 16,
            keep_alive: Some(Duration::from_secs(15)),
        }
    }
}

impl MessagingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store = env::var("MESSAGING_DATABASE")
            .map(|raw| StoreBackend::parse(&raw))
            .unwrap_or(defaults.store);

        let queue_capacity = match env::var("MESSAGING_QUEUE_CAPACITY") {
            Ok(raw) => match parse_number("MESSAGING_QUEUE_CAPACITY", &raw)? {
                0 => None,
                capacity => Some(capacity as usize),
            },
            Err(_) => defaults.queue_capacity,
        };

        let overflow = match env::var("MESSAGING_QUEUE_OVERFLOW") {
            Ok(raw) => OverflowPolicy::parse(&raw).ok_or(ConfigError::InvalidOverflow(raw))?,
            Err(_) => defaults.overflow,
        };

        let stream_buffer = match env::var("MESSAGING_STREAM_BUFFER") {
            Ok(raw) => (parse_number("MESSAGING_STREAM_BUFFER", &raw)? as usize).max(1),
            Err(_) => defaults.stream_buffer,
        };

        let keep_alive = match env::var("MESSAGING_KEEP_ALIVE_SECS") {
            Ok(raw) => match parse_number("MESSAGING_KEEP_ALIVE_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            Err(_) => defaults.keep_alive,
        };

        Ok(Self {
            store,
            queue_capacity,
            overflow,
            stream_buffer,
            keep_alive,
        })
    }
}

fn parse_number(variable: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber { variable })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidOverflow(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a non-negative integer")
            }
            ConfigError::InvalidOverflow(value) => write!(
                f,
                "MESSAGING_QUEUE_OVERFLOW must be 'drop-oldest' or 'drop-newest', got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidOverflow(_) => None,
        }
    }
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
