//! Shared application state, constructed once at startup and cloned cheaply per request.

use std::sync::Arc;
use std::time::Duration;

use super::super::config::AppConfig;
use super::super::gated_client::ChatModelWrapper;
use super::super::guard::{GuardConfig, RequestGuard};
use super::super::history::SharedHistoryStore;
use super::super::inbox::Inbox;
use super::super::metrics::Metrics;
use super::super::semaphore::ModelSemaphore;
use super::super::tools::ToolRegistry;
use crate::cloudllm::client_wrapper::ClientWrapper;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub model: Arc<ChatModelWrapper>,
    pub inbox: Arc<Inbox>,
    pub guard: Arc<RequestGuard>,
    pub tools: Arc<dyn ToolRegistry>,
    pub history: SharedHistoryStore,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        inner_model: Arc<dyn ClientWrapper>,
        kv_backend: Arc<dyn super::super::kv::KvBackend>,
        tools: Arc<dyn ToolRegistry>,
        history: SharedHistoryStore,
        metrics: Arc<Metrics>,
    ) -> Self {
        let semaphore = Arc::new(ModelSemaphore::new(
            kv_backend.clone(),
            config.max_concurrency,
            config.slot_timeout,
        ));
        let model = Arc::new(ChatModelWrapper::new(
            inner_model,
            semaphore,
            config.acquire_timeout,
        ));
        let inbox = Arc::new(Inbox::new(
            kv_backend.clone(),
            config.inbox_max_size,
            Duration::from_secs(300),
        ));
        let guard = Arc::new(RequestGuard::new(
            kv_backend,
            GuardConfig {
                rate_window: Duration::from_secs(1),
                per_ip_limit: config.chat_rate_limit_per_second,
                global_limit: config.chat_global_rate_limit,
                dedup_window: config.dedup_window,
                nonce_ttl: Duration::from_secs(60),
            },
        ));

        Self {
            config,
            model,
            inbox,
            guard,
            tools,
            history,
            metrics,
        }
    }
}
