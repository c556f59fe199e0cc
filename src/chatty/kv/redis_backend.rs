//! Redis-backed [`KvBackend`]: atomic Lua scripts plus Pub/Sub notification.
//!
//! Grounded on the reference implementation's `infra/concurrency/redis_backend.py`: the same
//! four scripts (enter/leave/try-acquire/release+notify), the same TTL-refresh-on-every-op
//! crash-safety property, and the same sorted-set sliding window for the rate-limit check.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::Script;

use super::{GuardCheck, KvBackend, KvError, SlotResult};

// Counter key stores a plain integer. `max` and the new value are compared in Lua so the
// read-modify-write is a single round trip and therefore atomic across replicas.
const ENTER_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local max = tonumber(ARGV[1])
if current >= max then
  return -1
end
local new_val = redis.call('INCR', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[2])
return new_val
"#;

const LEAVE_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
  redis.call('DECR', KEYS[1])
end
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return 1
"#;

const RELEASE_AND_NOTIFY_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
  redis.call('DECR', KEYS[1])
end
redis.call('PEXPIRE', KEYS[1], ARGV[1])
redis.call('PUBLISH', KEYS[2], '1')
return 1
"#;

// Sliding-window rate check: trim, insert, count, refresh TTL — one round trip.
const RATE_CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local ttl_ms = tonumber(ARGV[4])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window_ms)
redis.call('ZADD', key, now, now .. '-' .. math.random(1, 1000000000))
local count = redis.call('ZCARD', key)
redis.call('PEXPIRE', key, ttl_ms)
if count > limit then
  return 0
end
return 1
"#;

const SET_IF_ABSENT_SCRIPT: &str = r#"
local ok = redis.call('SET', KEYS[1], '1', 'NX', 'PX', ARGV[1])
if ok then
  return 1
end
return 0
"#;

/// Shared KV backend coordinating the Inbox, Model Semaphore, and Request Guard across
/// replicas via Redis.
pub struct RedisKvBackend {
    conn: ConnectionManager,
    client: redis::Client,
}

impl RedisKvBackend {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url).map_err(|e| KvError(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(Self { conn, client })
    }
}

#[async_trait]
impl KvBackend for RedisKvBackend {
    async fn inbox_enter(&self, key: &str, max: u64, ttl: Duration) -> Result<SlotResult, KvError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(ENTER_SCRIPT)
            .key(key)
            .arg(max)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(if result < 0 {
            SlotResult::Full
        } else {
            SlotResult::Admitted(result as u64)
        })
    }

    async fn inbox_leave(&self, key: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(LEAVE_SCRIPT)
            .key(key)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(())
    }

    async fn sem_try_acquire(
        &self,
        key: &str,
        max: u64,
        ttl: Duration,
    ) -> Result<SlotResult, KvError> {
        // Same shape as inbox_enter: bounded counter, refresh TTL on success.
        self.inbox_enter(key, max, ttl).await
    }

    async fn sem_release(
        &self,
        key: &str,
        ttl: Duration,
        notify_channel: &str,
    ) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_AND_NOTIFY_SCRIPT)
            .key(key)
            .key(notify_channel)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_notification(
        &self,
        notify_channel: &str,
        timeout: Duration,
    ) -> Result<(), KvError> {
        // Never call with a zero-or-negative timeout: the semaphore wait path enforces this.
        debug_assert!(timeout > Duration::ZERO);

        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| KvError(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(notify_channel)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        let mut stream = pubsub.on_message();

        match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(_msg)) => Ok(()),
            Ok(None) => Err(KvError("pubsub stream closed".to_string())),
            Err(_elapsed) => Err(KvError("notification wait timed out".to_string())),
        }
    }

    async fn rate_check(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
        limit: u64,
        ttl: Duration,
    ) -> Result<GuardCheck, KvError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(RATE_CHECK_SCRIPT)
            .key(key)
            .arg(now_millis)
            .arg(window.as_millis() as u64)
            .arg(limit)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(if result == 1 {
            GuardCheck::Pass
        } else {
            GuardCheck::Fail
        })
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<GuardCheck, KvError> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(SET_IF_ABSENT_SCRIPT)
            .key(key)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| KvError(e.to_string()))?;
        Ok(if result == 1 {
            GuardCheck::Pass
        } else {
            GuardCheck::Fail
        })
    }
}
