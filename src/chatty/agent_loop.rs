//! Agent Loop: multi-round tool-call driver bounded by `max_rounds` (§4.9).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cloudllm::client_wrapper::{ClientWrapper, Message, NativeToolCall, Role};

use super::error::ChattyError;
use super::events::{StreamEvent, ToolCallStatus};
use super::id;
use super::stream_mapper::{self, ChunkAccumulator};
use super::tools::ToolRegistry;

/// Globally configurable round cap and per-tool deadline (Open Question resolved in DESIGN.md:
/// `max_rounds` is a process-wide setting, not per-request).
#[derive(Clone, Debug)]
pub struct AgentLoopConfig {
    pub max_rounds: usize,
    pub tool_timeout: Duration,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            tool_timeout: Duration::from_secs(10),
        }
    }
}

/// Drive `model` through up to `config.max_rounds` tool-call rounds, seeded with `persona`,
/// `history`, and `query`. Emits [`StreamEvent`]s on `events_tx` as they arrive; returns once the
/// loop terminates naturally (no further tool calls) or the round cap is reached. Round-cap
/// termination is not an error: the last model output is what the caller sees.
pub async fn run(
    model: Arc<dyn ClientWrapper>,
    tools: Arc<dyn ToolRegistry>,
    persona: &str,
    history: Vec<Message>,
    query: &str,
    config: &AgentLoopConfig,
    events_tx: mpsc::Sender<StreamEvent>,
) -> Result<(), ChattyError> {
    let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 2);
    messages.push(Message {
        role: Role::System,
        content: std::sync::Arc::from(persona),
        tool_calls: vec![],
    });
    messages.extend(history);
    messages.push(Message {
        role: Role::User,
        content: std::sync::Arc::from(query),
        tool_calls: vec![],
    });

    let tool_defs = tools.list();
    let native_tools = if tool_defs.is_empty() { None } else { Some(tool_defs) };

    for _round in 0..config.max_rounds {
        let stream = model
            .send_message_stream(&messages, native_tools.clone())
            .await
            .map_err(|e| ChattyError::ModelUnreachable(e.to_string()))?;

        let (content, tool_calls) = match stream {
            Some(mut chunk_stream) => {
                use futures_util::StreamExt;
                let mut accumulator = ChunkAccumulator::new();
                while let Some(chunk_result) = chunk_stream.next().await {
                    let chunk = chunk_result.map_err(|e| ChattyError::ModelUnreachable(e.to_string()))?;
                    for event in stream_mapper::map_chunk(&chunk, &mut accumulator) {
                        if events_tx.send(event).await.is_err() {
                            // Receiver dropped: client disconnected. Unwind quietly.
                            return Err(ChattyError::ClientDisconnected);
                        }
                    }
                }
                accumulator.assembled()
            }
            None => {
                // Provider has no streaming support: fall through to the request/response path.
                let reply = model
                    .send_message(&messages, native_tools.clone())
                    .await
                    .map_err(|e| ChattyError::ModelUnreachable(e.to_string()))?;
                if !reply.content.is_empty() {
                    let event = StreamEvent::Content {
                        content: reply.content.to_string(),
                        message_id: None,
                    };
                    if events_tx.send(event).await.is_err() {
                        return Err(ChattyError::ClientDisconnected);
                    }
                }
                (reply.content.to_string(), reply.tool_calls)
            }
        };

        if tool_calls.is_empty() {
            return Ok(());
        }

        messages.push(Message {
            role: Role::Assistant,
            content: std::sync::Arc::from(content.as_str()),
            tool_calls: tool_calls.clone(),
        });

        for call in &tool_calls {
            let message_id = id::new_message_id();
            let result = tools
                .execute(&call.name, call.arguments.clone(), config.tool_timeout)
                .await;

            let (status, result_str) = match result {
                Ok(output) => (ToolCallStatus::Completed, output),
                Err(e) => (ToolCallStatus::Error, format!("Error: {}", e)),
            };

            if events_tx
                .send(StreamEvent::ToolCall {
                    name: call.name.clone(),
                    status,
                    arguments: None,
                    result: Some(result_str.clone()),
                    message_id: Some(message_id.clone()),
                })
                .await
                .is_err()
            {
                return Err(ChattyError::ClientDisconnected);
            }

            messages.push(Message {
                role: Role::Tool {
                    call_id: call.id.clone(),
                },
                content: std::sync::Arc::from(result_str.as_str()),
                tool_calls: vec![],
            });
        }
    }

    Ok(())
}

#[allow(dead_code)]
fn normalize_tool_call(fragment: &serde_json::Value) -> Option<NativeToolCall> {
    // Providers put name/args/id either on the fragment directly or nested under "function".
    let function = fragment.get("function");
    let name = fragment
        .get("name")
        .or_else(|| function.and_then(|f| f.get("name")))
        .and_then(|v| v.as_str())?
        .to_string();
    let id = fragment
        .get("id")
        .or_else(|| function.and_then(|f| f.get("id")))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let raw_args = fragment
        .get("args")
        .or_else(|| fragment.get("arguments"))
        .or_else(|| function.and_then(|f| f.get("arguments")));
    let arguments = match raw_args {
        Some(serde_json::Value::String(s)) => {
            serde_json::from_str(s).unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
        }
        Some(other) => other.clone(),
        None => serde_json::Value::Object(serde_json::Map::new()),
    };
    Some(NativeToolCall { id, name, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_fragment_with_nested_function_object() {
        let fragment = serde_json::json!({
            "id": "call_1",
            "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}
        });
        let call = normalize_tool_call(&fragment).unwrap();
        assert_eq!(call.name, "search");
        assert_eq!(call.arguments["q"], "rust");
    }

    #[test]
    fn normalizes_fragment_with_flat_fields() {
        let fragment = serde_json::json!({
            "id": "call_2",
            "name": "calculator",
            "args": {"expression": "1+1"}
        });
        let call = normalize_tool_call(&fragment).unwrap();
        assert_eq!(call.name, "calculator");
        assert_eq!(call.arguments["expression"], "1+1");
    }
}
