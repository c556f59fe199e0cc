//! Entry point for the chat gateway HTTP server.
//!
//! Wires the pieces described in SPEC_FULL.md's component sections into one running process:
//! load config from the environment, pick a KV backend (Redis if configured, otherwise an
//! in-process one for single-replica deployments), pick a history store the same way, build the
//! default tool registry and the model client, then serve the router on `CHATTY_BIND_ADDR`.

use std::net::SocketAddr;
use std::sync::Arc;

use chatty::chatty::api::deps::AppState;
use chatty::chatty::config::AppConfig;
use chatty::chatty::history::{InMemoryHistoryStore, PostgresHistoryStore, SharedHistoryStore};
use chatty::chatty::kv::local_backend::LocalKvBackend;
use chatty::chatty::kv::redis_backend::RedisKvBackend;
use chatty::chatty::kv::KvBackend;
use chatty::chatty::metrics::Metrics;
use chatty::chatty::tools::{StaticToolRegistry, ToolRegistry};
use chatty::cloudllm::client_wrapper::ClientWrapper;
use chatty::cloudllm::clients::openai::OpenAIClient;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Arc::new(AppConfig::from_env());

    let kv_backend: Arc<dyn KvBackend> = match &config.redis_url {
        Some(url) => {
            log::info!("connecting to redis at {}", url);
            Arc::new(
                RedisKvBackend::connect(url)
                    .await
                    .expect("failed to connect to redis"),
            )
        }
        None => {
            log::info!("no CHATTY_REDIS_URL set, using in-process kv backend");
            Arc::new(LocalKvBackend::new())
        }
    };

    let history: SharedHistoryStore = match &config.database_url {
        Some(url) => {
            log::info!("connecting to postgres history store");
            Arc::new(
                PostgresHistoryStore::connect(url)
                    .await
                    .expect("failed to connect to postgres"),
            )
        }
        None => {
            log::info!("no CHATTY_DATABASE_URL set, using in-memory history store");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let model: Arc<dyn ClientWrapper> = Arc::new(OpenAIClient::new_with_base_url(
        &config.model_api_key,
        &config.model_name,
        &config.model_base_url,
    ));

    let tools: Arc<dyn ToolRegistry> = Arc::new(StaticToolRegistry::with_default_tools());
    let metrics = Arc::new(Metrics::new());

    let state = AppState::new(config.clone(), model, kv_backend, tools, history, metrics);
    let app = chatty::chatty::api::router(state);

    let bind_addr: SocketAddr = std::env::var("CHATTY_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .expect("CHATTY_BIND_ADDR must be a valid socket address");

    log::info!("listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
