//! Shared counter store backed by Redis.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, warn};

use crate::error::StoreError;

use super::backend::CounterStore;

/// Default key namespace when none is configured.
const DEFAULT_PREFIX: &str = "turnstile";

/// Check-and-increment, evaluated atomically server-side.
///
/// KEYS[1] = counter key, ARGV[1] = limit, ARGV[2] = ttl in milliseconds
/// (0 = no expiry). Returns 1 when the acquisition succeeded.
const ACQUIRE_SCRIPT: &str = r#"
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count >= tonumber(ARGV[1]) then
  return 0
end
redis.call('INCR', KEYS[1])
if tonumber(ARGV[2]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 1
"#;

/// Decrement-and-delete-at-zero, evaluated atomically server-side.
const DECREASE_SCRIPT: &str = r#"
local count = redis.call('DECR', KEYS[1])
if count <= 0 then
  redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Counter store shared across processes through a Redis instance.
///
/// Counters live under `"{prefix}:{id}"`. Multi-step operations run as Lua
/// scripts so they are atomic server-side; the per-key TTL refreshed on every
/// acquisition is a leak backstop, release is always an explicit decrement.
///
/// Connection setup and authentication are the caller's concern: the store
/// takes an already-established [`ConnectionManager`], which reconnects on
/// its own when the server drops the connection.
pub struct RedisStore {
    connection: ConnectionManager,
    prefix: String,
    ttl_ms: u64,
    acquire_script: Script,
    decrease_script: Script,
}

impl RedisStore {
    /// Create a store under the default key prefix.
    ///
    /// `ttl` is the per-key expiry refreshed on each acquisition; pass
    /// [`Duration::ZERO`] to disable expiry. A TTL comfortably above the
    /// release window keeps live counters intact while still reclaiming
    /// keys whose release entries were lost.
    pub fn new(connection: ConnectionManager, ttl: Duration) -> Self {
        Self::with_prefix(connection, DEFAULT_PREFIX, ttl)
    }

    /// Create a store with an explicit key prefix.
    pub fn with_prefix(
        connection: ConnectionManager,
        prefix: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
            ttl_ms: ttl.as_millis() as u64,
            acquire_script: Script::new(ACQUIRE_SCRIPT),
            decrease_script: Script::new(DECREASE_SCRIPT),
        }
    }

    fn key(&self, id: &str) -> String {
        namespaced_key(&self.prefix, id)
    }
}

fn namespaced_key(prefix: &str, id: &str) -> String {
    format!("{}:{}", prefix, id)
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, id: &str) -> u64 {
        let mut connection = self.connection.clone();
        let count: Result<Option<u64>, _> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(&mut connection)
            .await;

        match count {
            Ok(count) => count.unwrap_or(0),
            Err(error) => {
                warn!(id, %error, "failed to read counter, reporting 0");
                0
            }
        }
    }

    async fn try_acquire(&self, id: &str, limit: u64) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let admitted: i64 = self
            .acquire_script
            .key(self.key(id))
            .arg(limit)
            .arg(self.ttl_ms)
            .invoke_async(&mut connection)
            .await?;
        Ok(admitted == 1)
    }

    async fn increase(&self, id: &str) -> Result<(), StoreError> {
        let key = self.key(id);
        let mut connection = self.connection.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("INCR").arg(&key).ignore();
        if self.ttl_ms > 0 {
            pipe.cmd("PEXPIRE").arg(&key).arg(self.ttl_ms).ignore();
        }
        let _: () = pipe.query_async(&mut connection).await?;
        Ok(())
    }

    async fn decrease(&self, id: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: i64 = self
            .decrease_script
            .key(self.key(id))
            .invoke_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn free(&self, id: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.key(id))
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn free_all(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let pattern = format!("{}:*", self.prefix);
        let mut cursor: u64 = 0;
        let mut freed: usize = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;

            if !keys.is_empty() {
                freed += keys.len();
                let _: () = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut connection)
                    .await?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(freed, "freed all entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced_under_prefix() {
        assert_eq!(
            namespaced_key(DEFAULT_PREFIX, "1.2.3.4"),
            "turnstile:1.2.3.4"
        );
        // The empty identifier is a valid key, not a special case.
        assert_eq!(namespaced_key("p", ""), "p:");
    }

    /// Full contract check against a live server. Skipped unless REDIS_URL
    /// is set, same as the rest of the integration-style tests.
    #[tokio::test]
    async fn test_redis_store_contract() {
        let url = match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("skipping: REDIS_URL not set");
                return;
            }
        };

        let client = redis::Client::open(url).unwrap();
        let connection = client.get_connection_manager().await.unwrap();

        let unique = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let store = RedisStore::with_prefix(
            connection,
            format!("turnstile_test_{unique}"),
            Duration::from_secs(30),
        );

        assert_eq!(store.get("a").await, 0);

        // Acquire up to the limit, then get denied.
        for _ in 0..3 {
            assert!(store.try_acquire("a", 3).await.unwrap());
        }
        assert!(!store.try_acquire("a", 3).await.unwrap());
        assert_eq!(store.get("a").await, 3);

        // Explicit decrement releases capacity.
        store.decrease("a").await.unwrap();
        assert_eq!(store.get("a").await, 2);
        assert!(store.try_acquire("a", 3).await.unwrap());

        // Decrease of a missing id is a no-op.
        store.decrease("missing").await.unwrap();
        assert_eq!(store.get("missing").await, 0);

        // Free is idempotent.
        store.free("a").await.unwrap();
        assert_eq!(store.get("a").await, 0);
        store.free("a").await.unwrap();
        assert_eq!(store.get("a").await, 0);

        // free_all clears everything under the prefix.
        store.increase("x").await.unwrap();
        store.increase("y").await.unwrap();
        store.free_all().await.unwrap();
        assert_eq!(store.get("x").await, 0);
        assert_eq!(store.get("y").await, 0);
    }
}
