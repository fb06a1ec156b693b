//! Configuration loaded from `SCRIBER_*` environment variables
//!
//! | Variable | Default |
//! |---|---|
//! | `SCRIBER_SCRIBE_ADDR` | `0.0.0.0:1463` |
//! | `SCRIBER_METRICS_ADDR` | `0.0.0.0:9090` |
//! | `SCRIBER_MODE` | `broadcast` (`publish`) |
//! | `SCRIBER_BACKEND` | `redis` (`memory`) |
//! | `SCRIBER_REDIS_ADDR` | `localhost:6379` |
//! | `SCRIBER_REDIS_DB` | `0` |
//! | `SCRIBER_REDIS_IDLE_TIMEOUT_SECS` | `240`, `0` disables recycling |
//! | `SCRIBER_REDIS_TIMEOUT_MS` | `1000` |
//! | `SCRIBER_QUEUE_KEY` | `centrifugo.api` |
//! | `SCRIBER_QUEUE_SHARDS` | `0` (unsharded) |
//! | `SCRIBER_MAX_FRAME_BYTES` | `16777216` |
//! | `SCRIBER_LOG_LEVEL` | `info` |
//! | `SCRIBER_LOG_FORMAT` | `pretty` (`json`) |

use crate::emit::RedisConfig;
use crate::error::{BridgeError, Result};
use scriber_core::Mode;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Which queue store to write to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Redis lists
    #[default]
    Redis,
    /// In-process lists, nothing leaves the process
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Destination queue naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Base key, used as-is when unsharded
    pub key: String,
    /// Number of `<key>.pub.<n>` shards, 0 for none
    pub shards: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key: "centrifugo.api".to_string(),
            shards: 0,
        }
    }
}

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Scribe listener address
    pub scribe_addr: SocketAddr,
    /// Metrics HTTP address
    pub metrics_addr: SocketAddr,
    /// Command shape produced for every record
    pub mode: Mode,
    /// Queue store
    pub backend: BackendKind,
    /// Redis connection settings
    pub redis: RedisConfig,
    /// Queue naming
    pub queue: QueueConfig,
    /// Largest accepted Scribe frame
    pub max_frame_bytes: usize,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scribe_addr: SocketAddr::from(([0, 0, 0, 0], 1463)),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            mode: Mode::default(),
            backend: BackendKind::default(),
            redis: RedisConfig::default(),
            queue: QueueConfig::default(),
            max_frame_bytes: 16 * 1024 * 1024,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let idle_secs: u64 = parse_or(
            get("SCRIBER_REDIS_IDLE_TIMEOUT_SECS"),
            "SCRIBER_REDIS_IDLE_TIMEOUT_SECS",
            240,
        )?;
        let timeout_ms: u64 =
            parse_or(get("SCRIBER_REDIS_TIMEOUT_MS"), "SCRIBER_REDIS_TIMEOUT_MS", 1000)?;
        if timeout_ms == 0 {
            return Err(BridgeError::Config(
                "SCRIBER_REDIS_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        let max_frame_bytes = parse_or(
            get("SCRIBER_MAX_FRAME_BYTES"),
            "SCRIBER_MAX_FRAME_BYTES",
            defaults.max_frame_bytes,
        )?;
        if max_frame_bytes == 0 {
            return Err(BridgeError::Config(
                "SCRIBER_MAX_FRAME_BYTES must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            scribe_addr: parse_or(
                get("SCRIBER_SCRIBE_ADDR"),
                "SCRIBER_SCRIBE_ADDR",
                defaults.scribe_addr,
            )?,
            metrics_addr: parse_or(
                get("SCRIBER_METRICS_ADDR"),
                "SCRIBER_METRICS_ADDR",
                defaults.metrics_addr,
            )?,
            mode: parse_or(get("SCRIBER_MODE"), "SCRIBER_MODE", defaults.mode)?,
            backend: parse_or(get("SCRIBER_BACKEND"), "SCRIBER_BACKEND", defaults.backend)?,
            redis: RedisConfig {
                addr: get("SCRIBER_REDIS_ADDR").unwrap_or(defaults.redis.addr),
                db: parse_or(get("SCRIBER_REDIS_DB"), "SCRIBER_REDIS_DB", defaults.redis.db)?,
                idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
                timeout: Duration::from_millis(timeout_ms),
            },
            queue: QueueConfig {
                key: get("SCRIBER_QUEUE_KEY").unwrap_or(defaults.queue.key),
                shards: parse_or(
                    get("SCRIBER_QUEUE_SHARDS"),
                    "SCRIBER_QUEUE_SHARDS",
                    defaults.queue.shards,
                )?,
            },
            max_frame_bytes,
            log_level: get("SCRIBER_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or(
                get("SCRIBER_LOG_FORMAT"),
                "SCRIBER_LOG_FORMAT",
                defaults.log_format,
            )?,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid {key} ({raw}): {e}"))),
    }
}
