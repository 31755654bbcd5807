use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::auth::middleware::require_auth;
use crate::config::ServerConfig;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.server);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/auth/send_sms/:mobile", post(handlers::auth::send_sms))
        .route("/api/v1/auth/login_sms", post(handlers::auth::login_sms))
        .route("/api/v1/user/get_user_info", get(handlers::users::get_user_info))
        .route("/api/v1/user/list_users", get(handlers::users::list_users))
        .route("/api/v1/chat/ask", post(handlers::chat::ask))
        .route("/api/v1/chat/ask/stream", post(handlers::chat::ask_stream))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An empty origin list means a local deployment; allow everything there.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
