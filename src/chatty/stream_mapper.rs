//! Stream Mapper: provider chunks → domain events, with an accumulator for loop continuation
//! (§4.8).
//!
//! Tool-call fragments are looked up by `id` when present, else by `index`, so a call whose
//! arguments arrive split across several chunks still accumulates into one entry.

use std::collections::HashMap;

use serde_json::Value;

use crate::cloudllm::client_wrapper::{MessageChunk, NativeToolCall, ToolCallChunk};

use super::events::{StreamEvent, ToolCallStatus};
use super::id;

/// One normalized tool call, assembled across one or more [`ToolCallChunk`] fragments.
#[derive(Debug, Clone, Default)]
struct AccumulatingCall {
    id: Option<String>,
    name: Option<String>,
    arguments_buf: String,
}

/// Folds a stream of [`MessageChunk`]s into the final assembled message (content + tool calls)
/// so the agent loop can decide whether another round is needed.
#[derive(Default)]
pub struct ChunkAccumulator {
    content: String,
    calls_by_key: HashMap<String, AccumulatingCall>,
    order: Vec<String>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fold(&mut self, chunk: &MessageChunk) {
        self.content.push_str(&chunk.content);

        for fragment in &chunk.tool_call_chunks {
            let key = fragment
                .id
                .clone()
                .unwrap_or_else(|| format!("idx:{}", fragment.index));
            if !self.calls_by_key.contains_key(&key) {
                self.order.push(key.clone());
            }
            let entry = self.calls_by_key.entry(key).or_default();
            if let Some(id) = &fragment.id {
                entry.id = Some(id.clone());
            }
            if let Some(name) = &fragment.name {
                entry.name = Some(name.clone());
            }
            if let Some(arg_fragment) = &fragment.arguments_fragment {
                entry.arguments_buf.push_str(arg_fragment);
            }
        }
    }

    /// Assembled content plus any tool calls seen so far, normalized into
    /// [`NativeToolCall`]s (malformed JSON arguments become `{}`, never a parse panic).
    pub fn assembled(&self) -> (String, Vec<NativeToolCall>) {
        let calls = self
            .order
            .iter()
            .filter_map(|key| self.calls_by_key.get(key))
            .filter_map(|call| {
                let name = call.name.clone()?;
                let arguments = parse_arguments(&call.arguments_buf);
                Some(NativeToolCall {
                    id: call.id.clone().unwrap_or_else(id::new_message_id),
                    name,
                    arguments,
                })
            })
            .collect();
        (self.content.clone(), calls)
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

/// Map one provider chunk to zero or one [`StreamEvent`], folding it into `accumulator` as a
/// side effect. `started` events are emitted once per tool-call fragment that carries a
/// non-empty `name`; pure argument-continuation fragments are folded but never emitted.
pub fn map_chunk(chunk: &MessageChunk, accumulator: &mut ChunkAccumulator) -> Vec<StreamEvent> {
    accumulator.fold(chunk);

    let named_fragments: Vec<&ToolCallChunk> = chunk
        .tool_call_chunks
        .iter()
        .filter(|f| f.name.as_deref().map(|n| !n.is_empty()).unwrap_or(false))
        .collect();

    if !named_fragments.is_empty() {
        return named_fragments
            .into_iter()
            .map(|fragment| {
                let arguments = fragment
                    .arguments_fragment
                    .as_deref()
                    .map(parse_arguments)
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                StreamEvent::ToolCall {
                    name: fragment.name.clone().unwrap_or_default(),
                    status: ToolCallStatus::Started,
                    arguments: Some(arguments),
                    result: None,
                    message_id: fragment.id.clone(),
                }
            })
            .collect();
    }

    if let Some(reasoning) = chunk.reasoning_content() {
        if !reasoning.is_empty() {
            return vec![StreamEvent::Thinking {
                content: reasoning.to_string(),
            }];
        }
    }

    if !chunk.content.is_empty() {
        return vec![StreamEvent::Content {
            content: chunk.content.clone(),
            message_id: None,
        }];
    }

    Vec::new()
}
