//! Redis queue backend
//!
//! Appends each batch to a Redis list with `RPUSH`. The connection is opened
//! lazily on first use and recycled when it has sat idle longer than the
//! configured idle timeout. Every network operation is bounded by a timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use scriber_core::{BackendError, QueueBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reconnect attempts the connection manager makes before giving up
const MAX_RETRIES: usize = 3;

/// Connection settings for [`RedisQueue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`
    pub addr: String,
    /// Logical database index
    pub db: i64,
    /// Recycle connections idle for longer than this; `None` keeps them forever
    pub idle_timeout: Option<Duration>,
    /// Bound on connect, read and write operations
    pub timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            db: 0,
            idle_timeout: Some(Duration::from_secs(240)),
            timeout: Duration::from_secs(1),
        }
    }
}

impl RedisConfig {
    /// Connection URL understood by the redis client
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }
}

struct Slot {
    conn: ConnectionManager,
    last_used: Instant,
}

/// Queue backend writing to Redis lists
pub struct RedisQueue {
    config: RedisConfig,
    client: redis::Client,
    slot: Mutex<Option<Slot>>,
    closed: AtomicBool,
}

impl RedisQueue {
    /// Create a backend for `config`
    ///
    /// Only validates the address; no connection is made until the first push.
    pub fn new(config: RedisConfig) -> Result<Self, BackendError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| BackendError::Connection(format!("invalid redis address: {e}")))?;
        Ok(Self {
            config,
            client,
            slot: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// The configuration in use
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a live connection, opening a new one if there is none or it went idle
    async fn connection(&self) -> Result<ConnectionManager, BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::NotReady);
        }
        {
            let mut slot = self.slot.lock();
            if let Some(current) = slot.as_mut() {
                let idle = current.last_used.elapsed();
                match self.config.idle_timeout {
                    Some(limit) if idle > limit => {
                        debug!(idle_secs = idle.as_secs(), "Recycling idle Redis connection");
                        *slot = None;
                    }
                    _ => {
                        current.last_used = Instant::now();
                        return Ok(current.conn.clone());
                    }
                }
            }
        }

        let conn = self.connect().await?;
        *self.slot.lock() = Some(Slot {
            conn: conn.clone(),
            last_used: Instant::now(),
        });
        Ok(conn)
    }

    async fn connect(&self) -> Result<ConnectionManager, BackendError> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(self.config.timeout)
            .set_response_timeout(self.config.timeout)
            .set_number_of_retries(MAX_RETRIES);

        let conn = tokio::time::timeout(
            self.config.timeout,
            self.client.get_connection_manager_with_config(manager_config),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.config.timeout))?
        .map_err(map_redis_error)?;

        info!(addr = %self.config.addr, db = self.config.db, "Connected to Redis");
        Ok(conn)
    }

    /// Forget the current connection so the next call reconnects
    fn reset(&self) {
        *self.slot.lock() = None;
    }
}

fn map_redis_error(e: redis::RedisError) -> BackendError {
    if e.is_timeout() {
        BackendError::Connection(format!("timed out: {e}"))
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        BackendError::Connection(e.to_string())
    } else {
        BackendError::Command(e.to_string())
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn push(&self, queue: &str, payload: String) -> Result<u64, BackendError> {
        let mut conn = self.connection().await?;

        let result = tokio::time::timeout(
            self.config.timeout,
            conn.rpush::<_, _, u64>(queue, payload),
        )
        .await;

        match result {
            Ok(Ok(len)) => Ok(len),
            Ok(Err(e)) => {
                let err = map_redis_error(e);
                if matches!(err, BackendError::Connection(_)) {
                    self.reset();
                }
                Err(err)
            }
            Err(_) => {
                self.reset();
                Err(BackendError::Timeout(self.config.timeout))
            }
        }
    }

    async fn health(&self) -> bool {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Redis health check could not connect");
                return false;
            }
        };

        let ping = tokio::time::timeout(self.config.timeout, async {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong
        })
        .await;

        matches!(ping, Ok(Ok(_)))
    }

    async fn shutdown(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        self.reset();
        info!("Redis queue closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://localhost:6379/0");
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(240)));
    }

    #[test]
    fn test_url_includes_db() {
        let config = RedisConfig {
            addr: "redis.internal:6380".to_string(),
            db: 3,
            ..RedisConfig::default()
        };
        assert_eq!(config.url(), "redis://redis.internal:6380/3");
    }

    #[test]
    fn test_new_does_not_connect() {
        // Nothing listens on port 1; construction must still succeed
        let queue = RedisQueue::new(RedisConfig {
            addr: "127.0.0.1:1".to_string(),
            ..RedisConfig::default()
        })
        .unwrap();
        assert_eq!(queue.name(), "redis");
        assert!(queue.slot.lock().is_none());
    }

    #[tokio::test]
    async fn test_push_to_unreachable_server_fails() {
        let queue = RedisQueue::new(RedisConfig {
            addr: "127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(200),
            ..RedisConfig::default()
        })
        .unwrap();

        let result = queue.push("centrifugo.api", "{}".to_string()).await;
        assert!(matches!(
            result,
            Err(BackendError::Connection(_)) | Err(BackendError::Timeout(_))
        ));
        assert!(!queue.health().await);
    }

    #[tokio::test]
    async fn test_shutdown_without_connection() {
        let queue = RedisQueue::new(RedisConfig::default()).unwrap();
        assert!(queue.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_push_after_shutdown_is_rejected() {
        let queue = RedisQueue::new(RedisConfig {
            addr: "127.0.0.1:1".to_string(),
            ..RedisConfig::default()
        })
        .unwrap();
        queue.shutdown().await.unwrap();

        // No reconnect attempt once closed
        assert_eq!(
            queue.push("centrifugo.api", "{}".to_string()).await,
            Err(BackendError::NotReady)
        );
        assert!(!queue.health().await);
        assert!(queue.slot.lock().is_none());
    }
}
