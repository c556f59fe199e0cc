//! History reader/writer collaborator interfaces (§6) and a PostgreSQL-backed implementation.
//!
//! The exact schema is out of scope; the core only depends on `load`/`append`. A
//! [`InMemoryHistoryStore`] satisfying the same traits is provided for tests and for running
//! without a database configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::cloudllm::client_wrapper::{Message, NativeToolCall, Role};

#[derive(Debug, thiserror::Error)]
#[error("history store error: {0}")]
pub struct HistoryError(pub String);

#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Most recent `max_count` messages for `conversation_id`, oldest first.
    async fn load(&self, conversation_id: &str, max_count: usize) -> Result<Vec<Message>, HistoryError>;
}

#[async_trait]
pub trait HistoryWriter: Send + Sync {
    /// Append one message. Idempotent on `message_id`: re-appending the same id is a no-op.
    async fn append(
        &self,
        conversation_id: &str,
        trace_id: &str,
        message_id: &str,
        message: &Message,
    ) -> Result<(), HistoryError>;
}

/// PostgreSQL-backed store. Expects a `messages` table with at least
/// `(conversation_id, trace_id, message_id, role, content, tool_calls_json, position)`.
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub async fn connect(database_url: &str) -> Result<Self, HistoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| HistoryError(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn role_to_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool { .. } => "tool",
    }
}

#[async_trait]
impl HistoryReader for PostgresHistoryStore {
    async fn load(&self, conversation_id: &str, max_count: usize) -> Result<Vec<Message>, HistoryError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT role, content, tool_calls_json, tool_call_id \
             FROM messages WHERE conversation_id = $1 \
             ORDER BY position DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError(e.to_string()))?;

        let mut messages: Vec<Message> = rows
            .into_iter()
            .rev()
            .map(|(role, content, tool_calls_json, tool_call_id)| {
                let role = match role.as_str() {
                    "system" => Role::System,
                    "user" => Role::User,
                    "tool" => Role::Tool {
                        call_id: tool_call_id.unwrap_or_default(),
                    },
                    _ => Role::Assistant,
                };
                let tool_calls: Vec<NativeToolCall> = tool_calls_json
                    .and_then(|json| serde_json::from_str(&json).ok())
                    .unwrap_or_default();
                Message {
                    role,
                    content: std::sync::Arc::from(content.as_str()),
                    tool_calls,
                }
            })
            .collect();
        messages.shrink_to_fit();
        Ok(messages)
    }
}

#[async_trait]
impl HistoryWriter for PostgresHistoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        trace_id: &str,
        message_id: &str,
        message: &Message,
    ) -> Result<(), HistoryError> {
        let tool_call_id = match &message.role {
            Role::Tool { call_id } => Some(call_id.clone()),
            _ => None,
        };
        let tool_calls_json = if message.tool_calls.is_empty() {
            None
        } else {
            let serializable: Vec<serde_json::Value> = message
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({"id": tc.id, "name": tc.name, "arguments": tc.arguments})
                })
                .collect();
            serde_json::to_string(&serializable).ok()
        };

        sqlx::query(
            "INSERT INTO messages (conversation_id, trace_id, message_id, role, content, tool_calls_json, tool_call_id, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, (SELECT COALESCE(MAX(position), 0) + 1 FROM messages WHERE conversation_id = $1)) \
             ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(conversation_id)
        .bind(trace_id)
        .bind(message_id)
        .bind(role_to_str(&message.role))
        .bind(message.content.as_ref())
        .bind(tool_calls_json)
        .bind(tool_call_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError(e.to_string()))?;
        Ok(())
    }
}

/// In-memory store for tests and single-process development without a database.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    conversations: Mutex<HashMap<String, Vec<(String, Message)>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryReader for InMemoryHistoryStore {
    async fn load(&self, conversation_id: &str, max_count: usize) -> Result<Vec<Message>, HistoryError> {
        let conversations = self.conversations.lock().await;
        let messages = conversations
            .get(conversation_id)
            .map(|entries| {
                let start = entries.len().saturating_sub(max_count);
                entries[start..].iter().map(|(_, m)| m.clone()).collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }
}

#[async_trait]
impl HistoryWriter for InMemoryHistoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        _trace_id: &str,
        message_id: &str,
        message: &Message,
    ) -> Result<(), HistoryError> {
        let mut conversations = self.conversations.lock().await;
        let entries = conversations.entry(conversation_id.to_string()).or_default();
        if entries.iter().any(|(id, _)| id == message_id) {
            return Ok(());
        }
        entries.push((message_id.to_string(), message.clone()));
        Ok(())
    }
}

/// Convenience bundle so `AppState` can hold one object implementing both traits.
pub trait HistoryStore: HistoryReader + HistoryWriter {}
impl<T: HistoryReader + HistoryWriter> HistoryStore for T {}

pub type SharedHistoryStore = Arc<dyn HistoryStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_is_idempotent_on_message_id() {
        let store = InMemoryHistoryStore::new();
        let msg = Message {
            role: Role::User,
            content: std::sync::Arc::from("hello"),
            tool_calls: vec![],
        };
        store.append("conv_1", "trace_1", "msg_1", &msg).await.unwrap();
        store.append("conv_1", "trace_1", "msg_1", &msg).await.unwrap();
        let loaded = store.load("conv_1", 10).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn load_returns_oldest_first_bounded_by_max_count() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            let msg = Message {
                role: Role::User,
                content: std::sync::Arc::from(format!("msg {}", i).as_str()),
                tool_calls: vec![],
            };
            store
                .append("conv_1", "trace_1", &format!("msg_{}", i), &msg)
                .await
                .unwrap();
        }
        let loaded = store.load("conv_1", 2).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content.as_ref(), "msg 3");
        assert_eq!(loaded[1].content.as_ref(), "msg 4");
    }
}
