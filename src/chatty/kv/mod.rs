//! Key-value backend abstraction shared by the Inbox, Model Semaphore, and Request Guard.
//!
//! Two implementations satisfy [`KvBackend`]: [`redis_backend::RedisKvBackend`] (a shared store
//! coordinating counters and Pub/Sub notification across replicas) and
//! [`local_backend::LocalKvBackend`] (in-process mutexes/condition signaling for single-replica
//! deployments or tests). Both expose the same four atomic primitives plus the guard batch.

pub mod local_backend;
pub mod redis_backend;

use async_trait::async_trait;
use std::time::Duration;

/// Result of a counter-bounded enter/acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResult {
    /// Admitted; carries the post-increment counter value.
    Admitted(u64),
    /// Counter was already at its cap.
    Full,
}

/// Outcome of one guard write (rate-limit cardinality check or dedup set-if-absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardCheck {
    /// The check passed (cardinality within limit, or key was absent and is now set).
    Pass,
    /// The check failed (cardinality exceeded, or key was already present).
    Fail,
}

/// The single interface the Inbox, Model Semaphore, and Request Guard depend on.
///
/// All operations that mutate more than one piece of state (the four scripts in §4.2, the guard
/// batch in §4.5) must be atomic with respect to every other caller, across replicas when backed
/// by the shared store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Inbox enter: increment `key`'s counter if below `max`, refreshing its TTL. Returns the new
    /// count on success.
    async fn inbox_enter(&self, key: &str, max: u64, ttl: Duration) -> Result<SlotResult, KvError>;

    /// Inbox leave: decrement `key`'s counter, floored at 0, refreshing its TTL.
    async fn inbox_leave(&self, key: &str, ttl: Duration) -> Result<(), KvError>;

    /// Semaphore try-acquire: increment `key`'s counter if below `max`, refreshing its TTL.
    async fn sem_try_acquire(
        &self,
        key: &str,
        max: u64,
        ttl: Duration,
    ) -> Result<SlotResult, KvError>;

    /// Semaphore release: decrement `key`'s counter, floored at 0, refresh TTL, and publish a
    /// single byte on `notify_channel` so waiters wake without polling.
    async fn sem_release(&self, key: &str, ttl: Duration, notify_channel: &str)
        -> Result<(), KvError>;

    /// Block until a message arrives on `notify_channel` or `timeout` elapses. Used by the
    /// semaphore's wait path between try-acquire attempts.
    async fn wait_for_notification(&self, notify_channel: &str, timeout: Duration)
        -> Result<(), KvError>;

    /// Sliding-window rate check: drop entries older than `now - window` from the `key` sorted
    /// set, insert `now`, read cardinality, refresh TTL. Returns [`GuardCheck::Fail`] when the
    /// resulting cardinality exceeds `limit`.
    async fn rate_check(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
        limit: u64,
        ttl: Duration,
    ) -> Result<GuardCheck, KvError>;

    /// Set-if-absent with TTL, used for fingerprint and nonce dedup. Returns
    /// [`GuardCheck::Fail`] when `key` was already present.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<GuardCheck, KvError>;
}

/// Error surfaced by a [`KvBackend`] operation (connection failure, script error, etc).
#[derive(Debug, thiserror::Error)]
#[error("kv backend error: {0}")]
pub struct KvError(pub String);
