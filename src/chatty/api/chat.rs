//! `POST {api_prefix}/chat`: the one HTTP endpoint this gateway exposes (§4.11).
//!
//! Composition order, fixed: parse body -> resolve real IP -> request guard -> inbox admission ->
//! resolve/mint conversation id -> mint trace id -> load history -> stream the agent loop back
//! over SSE. Any failure up through inbox admission is a plain JSON rejection; every failure from
//! there on is folded into the SSE stream as a terminal event, never a bare dropped connection.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::deps::AppState;
use crate::chatty::agent_loop::{self, AgentLoopConfig};
use crate::chatty::error::ChattyError;
use crate::chatty::id;
use crate::chatty::real_ip::resolve_real_ip;
use crate::chatty::sse::envelope;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Serialize)]
struct RejectionBody {
    detail: String,
}

fn reject(error: ChattyError) -> Response {
    let status = error
        .http_status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(RejectionBody {
            detail: error.http_detail(),
        }),
    )
        .into_response()
}

pub async fn chat(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return reject(ChattyError::Validation("query must not be empty".to_string()));
    }

    let peer_addr = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let ip = resolve_real_ip(&headers, peer_addr.as_deref());

    let now_millis = chrono::Utc::now().timestamp_millis();
    if let Err(e) = state
        .guard
        .check(&ip, &request.query, request.nonce.as_deref(), now_millis)
        .await
    {
        return reject(e);
    }

    if let Err(e) = state.inbox.enter().await {
        return reject(e);
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(id::new_conversation_id);
    let trace_id = id::new_trace_id();

    let history = state
        .history
        .load(&conversation_id, state.config.max_conversation_length)
        .await
        .unwrap_or_default();

    let model = state.model.clone();
    let tools = state.tools.clone();
    let persona = state.config.persona.clone();
    let query = request.query.clone();
    let loop_config = AgentLoopConfig {
        max_rounds: state.config.max_rounds,
        tool_timeout: state.config.tool_timeout,
    };
    let request_timeout = state.config.request_timeout;
    let metrics = state.metrics.clone();
    let inbox_for_finish = state.inbox.clone();

    let stream = envelope(
        request_timeout,
        metrics,
        move |events_tx| async move {
            agent_loop::run(model, tools, &persona, history, &query, &loop_config, events_tx).await
        },
        move |_code| {
            tokio::spawn(async move { inbox_for_finish.leave().await });
        },
    );

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(
        "X-Chatty-Trace",
        HeaderValue::from_str(&trace_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );
    headers.insert(
        "X-Chatty-Conversation",
        HeaderValue::from_str(&conversation_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("X-Chatty-Trace, X-Chatty-Conversation"),
    );

    response
}
