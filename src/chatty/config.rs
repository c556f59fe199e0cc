//! Process configuration, read once at startup from environment variables (§4.14, §6).
//!
//! Mirrors the teacher's configuration pattern of one plain struct built by the caller rather
//! than a file-parsing layer: no TOML/YAML dependency is introduced, only env var lookups with
//! documented defaults.

use std::time::Duration;

/// Every knob enumerated in §6, resolved once and held immutably for the process lifetime.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_prefix: String,

    pub inbox_max_size: u64,
    pub max_concurrency: u64,
    pub acquire_timeout: Duration,
    pub slot_timeout: Duration,
    pub request_timeout: Duration,
    pub tool_timeout: Duration,

    pub chat_rate_limit_per_second: u64,
    pub chat_global_rate_limit: u64,
    pub dedup_window: Duration,
    pub max_conversation_length: usize,

    pub send_traceback: bool,

    pub redis_url: Option<String>,
    pub database_url: Option<String>,

    pub model_base_url: String,
    pub model_api_key: String,
    pub model_name: String,

    pub persona: String,
    pub max_rounds: usize,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parsed(name, default_ms))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl AppConfig {
    /// Load configuration from the process environment, falling back to the defaults
    /// documented in SPEC_FULL.md §6 wherever a variable is unset.
    pub fn from_env() -> Self {
        Self {
            api_prefix: env_or("CHATTY_API_PREFIX", "/api/v1"),

            inbox_max_size: env_parsed("CHATTY_INBOX_MAX_SIZE", 64),
            max_concurrency: env_parsed("CHATTY_MAX_CONCURRENCY", 4),
            acquire_timeout: env_millis("CHATTY_ACQUIRE_TIMEOUT_MS", 15_000),
            slot_timeout: env_millis("CHATTY_SLOT_TIMEOUT_MS", 30_000),
            request_timeout: env_millis("CHATTY_REQUEST_TIMEOUT_MS", 120_000),
            tool_timeout: env_millis("CHATTY_TOOL_TIMEOUT_MS", 10_000),

            chat_rate_limit_per_second: env_parsed("CHATTY_RATE_LIMIT_PER_SECOND", 2),
            chat_global_rate_limit: env_parsed("CHATTY_GLOBAL_RATE_LIMIT", 50),
            dedup_window: env_millis("CHATTY_DEDUP_WINDOW_MS", 5_000),
            max_conversation_length: env_parsed("CHATTY_MAX_CONVERSATION_LENGTH", 40),

            send_traceback: env_bool("CHATTY_SEND_TRACEBACK", false),

            redis_url: std::env::var("CHATTY_REDIS_URL").ok(),
            database_url: std::env::var("CHATTY_DATABASE_URL").ok(),

            model_base_url: env_or("CHATTY_MODEL_BASE_URL", "https://api.openai.com/v1"),
            model_api_key: env_or("CHATTY_MODEL_API_KEY", ""),
            model_name: env_or("CHATTY_MODEL_NAME", "gpt-4.1-mini"),

            persona: env_or(
                "CHATTY_PERSONA",
                "You are a helpful assistant with access to tools. Use them when they help answer the question.",
            ),
            max_rounds: env_parsed("CHATTY_MAX_ROUNDS", 3),
        }
    }
}
