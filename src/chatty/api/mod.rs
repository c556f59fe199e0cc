pub mod chat;
pub mod deps;

use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::deps::AppState;

/// Build the router: one route, a permissive CORS layer (tightened by a reverse proxy in
/// production deployments), and request tracing matching the teacher's `tower-http` usage.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&format!("{}/chat", state.config.api_prefix), post(chat::chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
