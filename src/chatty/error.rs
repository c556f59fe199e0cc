//! Error taxonomy for the chat gateway.
//!
//! A single enum carries both the pre-admission HTTP mapping and the post-admission SSE
//! error-code mapping, so the two surfaces (§6/§7 of the design) can never drift apart.

use thiserror::Error;

/// Scope a rate limit was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Ip,
    Global,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitScope::Ip => write!(f, "ip"),
            RateLimitScope::Global => write!(f, "global"),
        }
    }
}

/// Every way a request can fail, from body parsing through the agent loop.
#[derive(Debug, Error)]
pub enum ChattyError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("rate limited ({0})")]
    RateLimited(RateLimitScope),

    #[error("duplicate request")]
    DuplicateRequest,

    #[error("inbox full")]
    InboxFull,

    #[error("semaphore acquire timed out")]
    AcquireTimeout,

    #[error("upstream model unreachable: {0}")]
    ModelUnreachable(String),

    #[error("request deadline exceeded")]
    RequestTimeout,

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("cancelled")]
    Cancelled,

    #[error("processing error: {0}")]
    Processing(String),
}

impl ChattyError {
    /// HTTP status this error maps to when it occurs *before* admission (pre-stream).
    ///
    /// Returns `None` for variants that only make sense once a stream is already open
    /// (those are surfaced as in-stream `Error` events instead, never as an HTTP status).
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ChattyError::Validation(_) => Some(422),
            ChattyError::RateLimited(_) => Some(429),
            ChattyError::DuplicateRequest => Some(409),
            ChattyError::InboxFull => Some(429),
            _ => None,
        }
    }

    /// `detail` string surfaced in the JSON rejection body (§6).
    pub fn http_detail(&self) -> String {
        match self {
            ChattyError::DuplicateRequest => {
                "duplicate request: an identical request is already in flight".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Stable code attached to a terminal in-stream `Error` event (§4.10, §7).
    pub fn stream_code(&self) -> &'static str {
        match self {
            ChattyError::AcquireTimeout => "MODEL_BUSY",
            ChattyError::ModelUnreachable(_) => "MODEL_UNREACHABLE",
            ChattyError::RequestTimeout => "REQUEST_TIMEOUT",
            ChattyError::Processing(_) => "PROCESSING_ERROR",
            // Validation/RateLimited/DuplicateRequest/InboxFull never reach the stream layer:
            // the HTTP endpoint composition rejects the request before admission.
            _ => "PROCESSING_ERROR",
        }
    }
}
