//! In-process [`KvBackend`] for single-replica deployments and tests.
//!
//! Replicates the shared backend's semantics with a mutex-protected map instead of Redis:
//! bounded counters with the same enter/leave/acquire/release contract, `tokio::sync::Notify`
//! in place of Pub/Sub, and lazy eviction of expired sliding-window/dedup entries on access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{GuardCheck, KvBackend, KvError, SlotResult};

struct Counter {
    value: u64,
}

struct DedupEntry {
    expires_at: tokio::time::Instant,
}

struct RateWindow {
    timestamps: Vec<i64>,
}

#[derive(Default)]
struct State {
    counters: HashMap<String, Counter>,
    dedup: HashMap<String, DedupEntry>,
    rate_windows: HashMap<String, RateWindow>,
}

/// Local backend: one process's view of the inbox counter, semaphore counter, and guard state.
pub struct LocalKvBackend {
    state: Mutex<State>,
    notifiers: Mutex<HashMap<String, Arc<Notify>>>,
}

impl Default for LocalKvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKvBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notifiers: Mutex::new(HashMap::new()),
        }
    }

    async fn notifier_for(&self, channel: &str) -> Arc<Notify> {
        let mut notifiers = self.notifiers.lock().await;
        notifiers
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    async fn bounded_increment(&self, key: &str, max: u64) -> SlotResult {
        let mut state = self.state.lock().await;
        let counter = state
            .counters
            .entry(key.to_string())
            .or_insert(Counter { value: 0 });
        if counter.value >= max {
            return SlotResult::Full;
        }
        counter.value += 1;
        SlotResult::Admitted(counter.value)
    }

    async fn decrement_floor_zero(&self, key: &str) {
        let mut state = self.state.lock().await;
        if let Some(counter) = state.counters.get_mut(key) {
            if counter.value > 0 {
                counter.value -= 1;
            }
        }
    }
}

#[async_trait]
impl KvBackend for LocalKvBackend {
    async fn inbox_enter(&self, key: &str, max: u64, _ttl: Duration) -> Result<SlotResult, KvError> {
        Ok(self.bounded_increment(key, max).await)
    }

    async fn inbox_leave(&self, key: &str, _ttl: Duration) -> Result<(), KvError> {
        self.decrement_floor_zero(key).await;
        Ok(())
    }

    async fn sem_try_acquire(
        &self,
        key: &str,
        max: u64,
        _ttl: Duration,
    ) -> Result<SlotResult, KvError> {
        Ok(self.bounded_increment(key, max).await)
    }

    async fn sem_release(
        &self,
        key: &str,
        _ttl: Duration,
        notify_channel: &str,
    ) -> Result<(), KvError> {
        self.decrement_floor_zero(key).await;
        let notifier = self.notifier_for(notify_channel).await;
        notifier.notify_waiters();
        Ok(())
    }

    async fn wait_for_notification(
        &self,
        notify_channel: &str,
        timeout: Duration,
    ) -> Result<(), KvError> {
        debug_assert!(timeout > Duration::ZERO);
        let notifier = self.notifier_for(notify_channel).await;
        match tokio::time::timeout(timeout, notifier.notified()).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => Err(KvError("notification wait timed out".to_string())),
        }
    }

    async fn rate_check(
        &self,
        key: &str,
        now_millis: i64,
        window: Duration,
        limit: u64,
        _ttl: Duration,
    ) -> Result<GuardCheck, KvError> {
        let mut state = self.state.lock().await;
        let window_ms = window.as_millis() as i64;
        let entry = state
            .rate_windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow { timestamps: Vec::new() });
        entry
            .timestamps
            .retain(|&ts| ts > now_millis - window_ms);
        entry.timestamps.push(now_millis);
        let count = entry.timestamps.len() as u64;
        Ok(if count > limit {
            GuardCheck::Fail
        } else {
            GuardCheck::Pass
        })
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<GuardCheck, KvError> {
        let mut state = self.state.lock().await;
        let now = tokio::time::Instant::now();
        // Lazy eviction: drop the entry if it's already expired before checking presence.
        if let Some(entry) = state.dedup.get(key) {
            if entry.expires_at <= now {
                state.dedup.remove(key);
            }
        }
        if state.dedup.contains_key(key) {
            return Ok(GuardCheck::Fail);
        }
        state.dedup.insert(
            key.to_string(),
            DedupEntry {
                expires_at: now + ttl,
            },
        );
        Ok(GuardCheck::Pass)
    }
}
