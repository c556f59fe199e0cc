//! Chat Model Wrapper: gates every model invocation through the semaphore and rescues the
//! `reasoning_content` streaming delta that standard decoders drop (§4.7).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::Stream;

use crate::cloudllm::client_wrapper::{
    ClientWrapper, Message, MessageChunk, MessageChunkStream, MessageStreamFuture, ToolDefinition,
};

use super::semaphore::ModelSemaphore;

/// Wraps any [`ClientWrapper`] so every call — streaming or not — acquires a semaphore slot for
/// its duration and releases it on completion, cancellation, or error. Slots are never held
/// across rounds: each call to `send_message`/`send_message_stream` acquires and releases its
/// own slot.
pub struct ChatModelWrapper {
    inner: Arc<dyn ClientWrapper>,
    semaphore: Arc<ModelSemaphore>,
    acquire_timeout: Duration,
}

impl ChatModelWrapper {
    pub fn new(
        inner: Arc<dyn ClientWrapper>,
        semaphore: Arc<ModelSemaphore>,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            semaphore,
            acquire_timeout,
        }
    }
}

/// Rescues `metadata["raw_delta"]`'s `choices[0].delta.reasoning_content` into
/// `metadata["reasoning_content"]`. A no-op for chunks that never carried a raw delta (i.e.
/// providers that only ever speak the standard schema).
fn rescue_reasoning(mut chunk: MessageChunk) -> MessageChunk {
    if chunk.metadata.contains_key("reasoning_content") {
        return chunk;
    }
    let Some(raw) = chunk.metadata.get("raw_delta") else {
        return chunk;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return chunk;
    };
    let reasoning = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("reasoning_content"))
        .and_then(|r| r.as_str());
    if let Some(text) = reasoning {
        if !text.is_empty() {
            chunk
                .metadata
                .insert("reasoning_content".to_string(), text.to_string());
        }
    }
    chunk
}

/// Stream combinator that keeps the gating [`super::semaphore::SemaphoreGuard`] alive for as
/// long as the underlying chunk stream is, and applies the reasoning rescue to every item.
/// Dropping this struct early (client disconnect, request-timeout cancellation) drops the guard
/// too, releasing the slot without any explicit `on_finish`-style bookkeeping.
struct GatedChunkStream<'a> {
    inner: MessageChunkStream,
    _guard: super::semaphore::SemaphoreGuard<'a>,
}

impl<'a> Stream for GatedChunkStream<'a> {
    type Item = Result<MessageChunk, Box<dyn std::error::Error>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // `inner` is already a `Pin<Box<..>>` and the guard holds no self-references, so the
        // whole struct is `Unpin` and a plain `&mut` projection is sound.
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(rescue_reasoning(chunk)))),
            other => other,
        }
    }
}

#[async_trait]
impl ClientWrapper for ChatModelWrapper {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let guard = self.semaphore.acquire(self.acquire_timeout).await?;
        let result = self.inner.send_message(messages, tools).await;
        guard.release().await;
        result
    }

    fn send_message_stream<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async move {
            let guard = self.semaphore.acquire(self.acquire_timeout).await?;
            match self.inner.send_message_stream(messages, tools).await? {
                Some(inner_stream) => {
                    let gated: MessageChunkStream = Box::pin(GatedChunkStream {
                        inner: inner_stream,
                        _guard: guard,
                    });
                    Ok(Some(gated))
                }
                None => {
                    guard.release().await;
                    Ok(None)
                }
            }
        })
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn get_last_usage(&self) -> Option<crate::cloudllm::client_wrapper::TokenUsage> {
        self.inner.get_last_usage().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn rescue_is_a_no_op_without_a_raw_delta() {
        let chunk = MessageChunk {
            content: "hi".to_string(),
            ..Default::default()
        };
        let rescued = rescue_reasoning(chunk.clone());
        assert_eq!(rescued.metadata.len(), 0);
        assert_eq!(rescued.content, chunk.content);
    }

    #[test]
    fn rescue_extracts_reasoning_content_from_raw_delta() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "raw_delta".to_string(),
            serde_json::json!({"choices": [{"delta": {"reasoning_content": "thinking..."}}]})
                .to_string(),
        );
        let chunk = MessageChunk {
            metadata,
            ..Default::default()
        };
        let rescued = rescue_reasoning(chunk);
        assert_eq!(
            rescued.metadata.get("reasoning_content").map(String::as_str),
            Some("thinking...")
        );
    }

    #[test]
    fn rescue_ignores_empty_reasoning_content() {
        let mut metadata = HashMap::new();
        metadata.insert(
            "raw_delta".to_string(),
            serde_json::json!({"choices": [{"delta": {"reasoning_content": ""}}]}).to_string(),
        );
        let chunk = MessageChunk {
            metadata,
            ..Default::default()
        };
        let rescued = rescue_reasoning(chunk);
        assert!(!rescued.metadata.contains_key("reasoning_content"));
    }
}
