//! The public `StreamEvent` wire schema (§3, §9 "tagged sum types").
//!
//! Serialized with `#[serde(tag = "type")]` so the variant name becomes the JSON `type`
//! discriminator, matching the reference implementation's discriminated event family.

use serde::Serialize;

/// Lifecycle status of a tool call, attached to [`StreamEvent::ToolCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Started,
    Completed,
    Error,
}

/// One frame of the public event stream. Exactly one JSON object per SSE `data:` line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Emitted exactly once, first event, after admission succeeds.
    #[serde(rename = "queued")]
    Queued { position: u64 },

    /// Provider reasoning tokens; zero or more, additive.
    #[serde(rename = "thinking")]
    Thinking { content: String },

    /// User-visible tokens; concatenation in emission order yields the final answer.
    #[serde(rename = "content")]
    Content {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// One stage of a tool call's lifecycle.
    #[serde(rename = "tool_call")]
    ToolCall {
        name: String,
        status: ToolCallStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Terminal; at most one per stream, emitted only on failure paths.
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl StreamEvent {
    /// Label used for the per-event-type metrics counter (§4.10).
    pub fn label(&self) -> &'static str {
        match self {
            StreamEvent::Queued { .. } => "queued",
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::Content { .. } => "content",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_the_discriminator() {
        let event = StreamEvent::Queued { position: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["position"], 3);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let event = StreamEvent::Content {
            content: "hi".to_string(),
            message_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("message_id").is_none());
    }
}
