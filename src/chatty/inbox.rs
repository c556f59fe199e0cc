//! Bounded admission counter with atomic enter/leave (§4.3).

use std::sync::Arc;
use std::time::Duration;

use crate::chatty::error::ChattyError;
use crate::chatty::kv::{KvBackend, SlotResult};

const INBOX_KEY: &str = "chatty:inbox:count";

/// Bounded admission gate. `enter` fails fast with [`ChattyError::InboxFull`] once `max` admitted
/// requests are outstanding; `leave` is always safe to call, including more than once.
pub struct Inbox {
    backend: Arc<dyn KvBackend>,
    max: u64,
    ttl: Duration,
}

impl Inbox {
    pub fn new(backend: Arc<dyn KvBackend>, max: u64, ttl: Duration) -> Self {
        Self { backend, max, ttl }
    }

    /// Admit one request, returning its informational (post-increment) position.
    pub async fn enter(&self) -> Result<u64, ChattyError> {
        match self
            .backend
            .inbox_enter(INBOX_KEY, self.max, self.ttl)
            .await
        {
            Ok(SlotResult::Admitted(position)) => Ok(position),
            Ok(SlotResult::Full) => Err(ChattyError::InboxFull),
            Err(e) => Err(ChattyError::Processing(e.to_string())),
        }
    }

    /// Release a previously admitted slot. Safe to call even if `enter` never succeeded for this
    /// caller (floored at zero by the backend), so `on_finish` callbacks can call it
    /// unconditionally.
    pub async fn leave(&self) {
        if let Err(e) = self.backend.inbox_leave(INBOX_KEY, self.ttl).await {
            log::warn!("inbox leave failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatty::kv::local_backend::LocalKvBackend;

    #[tokio::test]
    async fn rejects_once_full_and_recovers_after_leave() {
        let inbox = Inbox::new(Arc::new(LocalKvBackend::new()), 2, Duration::from_secs(30));
        assert_eq!(inbox.enter().await.unwrap(), 1);
        assert_eq!(inbox.enter().await.unwrap(), 2);
        assert!(matches!(inbox.enter().await, Err(ChattyError::InboxFull)));
        inbox.leave().await;
        assert_eq!(inbox.enter().await.unwrap(), 2);
    }
}
