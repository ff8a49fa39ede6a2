//! Redis-backed counter store.
//!
//! The increment-with-expiry step runs as a single Lua script, so the TTL
//! check and the write happen inside one Redis command. Two processes racing
//! on a fresh key can never both start a window, and no caller can observe
//! a TTL without the matching count.
//!
//! Connection setup is retried with linear backoff. Script invocations are
//! never retried: once one has been sent its effect may already be applied.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{CounterSnapshot, CounterStore, StoreError};
use crate::config::StoreConfig;
use crate::ratelimit::CounterKey;

/// KEYS[1] = counter key, ARGV[1] = window in milliseconds.
/// Returns {count, ttl_ms, created}.
const INCREMENT_WITH_EXPIRY: &str = r#"
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('SET', KEYS[1], 1, 'PX', ARGV[1])
  return {1, tonumber(ARGV[1]), 1}
end
local count = redis.call('INCR', KEYS[1])
return {count, ttl, 0}
"#;

/// Configuration for the Redis counter store.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1/")
    pub url: String,
    /// Namespace prepended to every counter key
    pub key_prefix: String,
    /// Upper bound on a single script invocation
    pub operation_timeout: Duration,
    /// Upper bound on one connection attempt
    pub connect_timeout: Duration,
    /// Connection attempts before giving up
    pub connect_attempts: u32,
    /// Delay added per failed connection attempt
    pub connect_backoff: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for RedisStoreConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            url: config.url.clone(),
            key_prefix: config.key_prefix.clone(),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            connect_attempts: config.connect_attempts.max(1),
            connect_backoff: Duration::from_millis(config.connect_backoff_ms),
        }
    }
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Unavailable(format!("timed out: {}", err))
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::UnexpectedReply(err.to_string())
        }
    }
}

/// Counter store shared by every service instance through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis, retrying the initial connection.
    ///
    /// # Errors
    /// Returns the last connection error once every attempt has failed.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())?;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(
                config.connect_timeout,
                ConnectionManager::new(client.clone()),
            )
            .await
            {
                Ok(Ok(connection)) => {
                    info!(url = %config.url, attempt, "Connected to Redis counter store");
                    return Ok(Self {
                        connection,
                        script: Script::new(INCREMENT_WITH_EXPIRY),
                        config,
                    });
                }
                Ok(Err(e)) => StoreError::from(e),
                Err(_) => StoreError::Timeout(config.connect_timeout),
            };

            if attempt >= config.connect_attempts {
                return Err(error);
            }

            let delay = config.connect_backoff * attempt;
            warn!(
                url = %config.url,
                attempt,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Redis connection failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// The full Redis key for a counter.
    pub fn store_key(&self, key: &CounterKey) -> String {
        key.to_store_key(&self.config.key_prefix)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiry(
        &self,
        key: &CounterKey,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let store_key = self.store_key(key);
        let window_ms = window.as_millis() as u64;
        let mut connection = self.connection.clone();

        let mut invocation = self.script.prepare_invoke();
        invocation.key(&store_key).arg(window_ms);

        let timeout = self.config.operation_timeout;
        let (count, ttl_ms, created): (i64, i64, i64) =
            match tokio::time::timeout(timeout, invocation.invoke_async(&mut connection)).await {
                Ok(reply) => reply?,
                Err(_) => {
                    debug!(key = %store_key, "Redis script invocation timed out");
                    return Err(StoreError::Timeout(timeout));
                }
            };

        if count < 1 || ttl_ms < 0 {
            return Err(StoreError::UnexpectedReply(format!(
                "count={} ttl_ms={}",
                count, ttl_ms
            )));
        }

        trace!(key = %store_key, count, ttl_ms, created, "Incremented Redis counter");

        Ok(CounterSnapshot {
            count: count as u64,
            ttl: Duration::from_millis(ttl_ms as u64),
            created: created == 1,
        })
    }
}
