//! Request Guard: per-IP + global rate limiting and fingerprint/nonce dedup (§4.5).
//!
//! All checks run against the same [`KvBackend`], in a fixed order, and the backend's own
//! operations are individually atomic; a shared backend therefore gives the whole guard atomic
//! semantics without a separate transaction wrapper. Priority on simultaneous failure: per-IP
//! rate > global rate > fingerprint > nonce, matching the reference implementation.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::chatty::error::{ChattyError, RateLimitScope};
use crate::chatty::kv::{GuardCheck, KvBackend};

/// Configuration for the request guard, sourced from the knobs in §6.
#[derive(Clone, Debug)]
pub struct GuardConfig {
    pub rate_window: Duration,
    pub per_ip_limit: u64,
    pub global_limit: u64,
    pub dedup_window: Duration,
    pub nonce_ttl: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            rate_window: Duration::from_secs(1),
            per_ip_limit: 2,
            global_limit: 50,
            dedup_window: Duration::from_secs(5),
            nonce_ttl: Duration::from_secs(60),
        }
    }
}

pub struct RequestGuard {
    backend: Arc<dyn KvBackend>,
    config: GuardConfig,
}

fn fingerprint(ip: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(query.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

impl RequestGuard {
    pub fn new(backend: Arc<dyn KvBackend>, config: GuardConfig) -> Self {
        Self { backend, config }
    }

    /// Run all applicable checks for `(ip, query, nonce)`. A zero limit disables that rate check;
    /// a zero `dedup_window` disables the fingerprint check. Returns `Ok(())` only if every
    /// applicable check passed.
    pub async fn check(
        &self,
        ip: &str,
        query: &str,
        nonce: Option<&str>,
        now_millis: i64,
    ) -> Result<(), ChattyError> {
        if self.config.per_ip_limit > 0 {
            let key = format!("chatty:rate:ip:{}", ip);
            let check = self
                .backend
                .rate_check(
                    &key,
                    now_millis,
                    self.config.rate_window,
                    self.config.per_ip_limit,
                    self.config.rate_window,
                )
                .await
                .map_err(|e| ChattyError::Processing(e.to_string()))?;
            if check == GuardCheck::Fail {
                return Err(ChattyError::RateLimited(RateLimitScope::Ip));
            }
        }

        if self.config.global_limit > 0 {
            let check = self
                .backend
                .rate_check(
                    "chatty:rate:global",
                    now_millis,
                    self.config.rate_window,
                    self.config.global_limit,
                    self.config.rate_window,
                )
                .await
                .map_err(|e| ChattyError::Processing(e.to_string()))?;
            if check == GuardCheck::Fail {
                return Err(ChattyError::RateLimited(RateLimitScope::Global));
            }
        }

        if !self.config.dedup_window.is_zero() {
            let key = format!("chatty:dedup:fp:{}", fingerprint(ip, query));
            let check = self
                .backend
                .set_if_absent(&key, self.config.dedup_window)
                .await
                .map_err(|e| ChattyError::Processing(e.to_string()))?;
            if check == GuardCheck::Fail {
                return Err(ChattyError::DuplicateRequest);
            }
        }

        if let Some(nonce) = nonce {
            let key = format!("chatty:dedup:nonce:{}", nonce);
            let check = self
                .backend
                .set_if_absent(&key, self.config.nonce_ttl)
                .await
                .map_err(|e| ChattyError::Processing(e.to_string()))?;
            if check == GuardCheck::Fail {
                return Err(ChattyError::DuplicateRequest);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatty::kv::local_backend::LocalKvBackend;

    fn guard() -> RequestGuard {
        RequestGuard::new(
            Arc::new(LocalKvBackend::new()),
            GuardConfig {
                rate_window: Duration::from_secs(60),
                per_ip_limit: 2,
                global_limit: 100,
                dedup_window: Duration::from_secs(60),
                nonce_ttl: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn second_identical_request_is_rejected_as_duplicate() {
        let g = guard();
        g.check("1.2.3.4", "hello", None, 1_000).await.unwrap();
        let result = g.check("1.2.3.4", "hello", None, 1_001).await;
        assert!(matches!(result, Err(ChattyError::DuplicateRequest)));
    }

    #[tokio::test]
    async fn per_ip_rate_limit_wins_over_dedup_on_third_distinct_query() {
        let g = guard();
        g.check("1.2.3.4", "q1", None, 1_000).await.unwrap();
        g.check("1.2.3.4", "q2", None, 1_001).await.unwrap();
        let result = g.check("1.2.3.4", "q3", None, 1_002).await;
        assert!(matches!(
            result,
            Err(ChattyError::RateLimited(RateLimitScope::Ip))
        ));
    }

    #[tokio::test]
    async fn nonce_dedup_rejects_repeat_even_with_distinct_query() {
        let g = guard();
        g.check("1.2.3.4", "q1", Some("n1"), 1_000).await.unwrap();
        let result = g.check("5.6.7.8", "q2", Some("n1"), 1_001).await;
        assert!(matches!(result, Err(ChattyError::DuplicateRequest)));
    }
}
