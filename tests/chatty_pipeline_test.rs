//! Exercises the admission -> agent loop -> SSE pipeline end to end against a fake model client
//! and the in-process KV backend, without going over HTTP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use chatty::chatty::agent_loop::{self, AgentLoopConfig};
use chatty::chatty::guard::{GuardConfig, RequestGuard};
use chatty::chatty::inbox::Inbox;
use chatty::chatty::kv::local_backend::LocalKvBackend;
use chatty::chatty::metrics::Metrics;
use chatty::chatty::sse::envelope;
use chatty::chatty::tools::{StaticToolRegistry, ToolRegistry};
use chatty::cloudllm::client_wrapper::{
    ClientWrapper, Message, MessageStreamFuture, NativeToolCall, Role, ToolDefinition,
};

/// A model stub that replies with a canned tool call on the first round and a plain answer
/// after it sees the tool result, so the agent loop exercises both the tool-call branch and
/// natural termination in one run.
struct ScriptedModel {
    round: AtomicUsize,
}

#[async_trait]
impl ClientWrapper for ScriptedModel {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let round = self.round.fetch_add(1, Ordering::SeqCst);
        if round == 0 {
            Ok(Message {
                role: Role::Assistant,
                content: std::sync::Arc::from(""),
                tool_calls: vec![NativeToolCall {
                    id: "call_1".to_string(),
                    name: "calculator".to_string(),
                    arguments: serde_json::json!({"expression": "2+2"}),
                }],
            })
        } else {
            let saw_tool_result = messages
                .iter()
                .any(|m| matches!(m.role, Role::Tool { .. }));
            assert!(saw_tool_result, "second round should see the tool result");
            Ok(Message {
                role: Role::Assistant,
                content: std::sync::Arc::from("the answer is 4"),
                tool_calls: vec![],
            })
        }
    }

    fn send_message_stream<'a>(
        &'a self,
        _messages: &'a [Message],
        _tools: Option<Vec<ToolDefinition>>,
    ) -> MessageStreamFuture<'a> {
        Box::pin(async move { Ok(None::<chatty::cloudllm::client_wrapper::MessageChunkStream>) })
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

#[tokio::test]
async fn request_guard_admits_then_rejects_over_the_rate_limit() {
    let kv = Arc::new(LocalKvBackend::new());
    let guard = RequestGuard::new(
        kv,
        GuardConfig {
            rate_window: Duration::from_secs(1),
            per_ip_limit: 1,
            global_limit: 100,
            dedup_window: Duration::from_secs(5),
            nonce_ttl: Duration::from_secs(60),
        },
    );

    let now = 1_000;
    guard
        .check("1.2.3.4", "hello", None, now)
        .await
        .expect("first request from this ip should be admitted");

    let second = guard.check("1.2.3.4", "a different question", None, now).await;
    assert!(second.is_err(), "second request within the window should be rate limited");
}

#[tokio::test]
async fn inbox_enforces_max_size_and_leave_frees_a_slot() {
    let kv = Arc::new(LocalKvBackend::new());
    let inbox = Inbox::new(kv, 1, Duration::from_secs(300));

    inbox.enter().await.expect("first admission succeeds");
    assert!(inbox.enter().await.is_err(), "inbox is full at max_size 1");

    inbox.leave().await;
    inbox.enter().await.expect("admission succeeds again after a slot frees up");
}

#[tokio::test]
async fn agent_loop_runs_a_tool_call_round_then_terminates_naturally() {
    let model: Arc<dyn ClientWrapper> = Arc::new(ScriptedModel {
        round: AtomicUsize::new(0),
    });
    let tools: Arc<dyn ToolRegistry> = Arc::new(StaticToolRegistry::with_default_tools());
    let config = AgentLoopConfig {
        max_rounds: 3,
        tool_timeout: Duration::from_secs(5),
    };
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    let handle = tokio::spawn(async move {
        agent_loop::run(model, tools, "You are helpful.", vec![], "what is 2+2?", &config, tx).await
    });

    let mut saw_tool_call = false;
    let mut saw_content = false;
    while let Some(event) = rx.recv().await {
        match event {
            chatty::chatty::events::StreamEvent::ToolCall { name, result, .. } => {
                assert_eq!(name, "calculator");
                assert!(result.unwrap().contains('4'));
                saw_tool_call = true;
            }
            chatty::chatty::events::StreamEvent::Content { content, .. } => {
                assert!(content.contains("4"));
                saw_content = true;
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    handle.await.unwrap().expect("agent loop should finish without error");
    assert!(saw_tool_call, "expected a tool_call event");
    assert!(saw_content, "expected a content event");
}

#[tokio::test]
async fn full_pipeline_admission_through_sse_envelope() {
    let model: Arc<dyn ClientWrapper> = Arc::new(ScriptedModel {
        round: AtomicUsize::new(0),
    });
    let tools: Arc<dyn ToolRegistry> = Arc::new(StaticToolRegistry::with_default_tools());
    let kv = Arc::new(LocalKvBackend::new());
    let inbox = Arc::new(Inbox::new(kv, 64, Duration::from_secs(300)));
    let metrics = Arc::new(Metrics::new());

    inbox.enter().await.expect("admission should succeed");

    let config = AgentLoopConfig {
        max_rounds: 3,
        tool_timeout: Duration::from_secs(5),
    };
    let inbox_for_finish = inbox.clone();

    let stream = envelope(
        Duration::from_secs(5),
        metrics.clone(),
        move |events_tx| async move {
            agent_loop::run(model, tools, "persona", vec![], "what is 2+2?", &config, events_tx).await
        },
        move |_code| {
            tokio::spawn(async move { inbox_for_finish.leave().await });
        },
    );

    let frames: Vec<_> = stream.collect().await;
    assert!(!frames.is_empty(), "the SSE stream should carry at least one frame");
    assert_eq!(metrics.sessions_total(), 1);
}
