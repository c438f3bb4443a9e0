//! Axum router configuration.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use super::{auth, handlers};
use crate::config::GatewayConfig;
use crate::gateway::QueryGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gateway: QueryGateway,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>, gateway: QueryGateway) -> Self {
        Self { config, gateway }
    }
}

/// Create the router with every route, the session guard and the static UI.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/refresh_token", get(auth::refresh_token))
        .route("/status", get(handlers::status))
        .route("/submit", post(handlers::submit))
        .route("/ui-api/props", post(handlers::props))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let static_files = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .merge(protected)
        .fallback_service(static_files)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .with_state(state)
}
