use axum::{
    Extension, Json, Router, extract::DefaultBodyLimit, middleware, routing::get,
};
use serde_json::{Value, json};
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};

use crate::security::headers::set_security_headers;
use crate::state::AppState;

pub mod notes;
pub mod users;

pub fn create_router() -> Router {
    tracing::debug!("Creating application router");
    Router::new()
        .route("/health", get(health))
        .merge(users::router())
        .merge(notes::router())
}

/// The complete application: API routes, the bundled client as fallback,
/// and the shared middleware stack.
pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    create_router()
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(middleware::from_fn(set_security_headers))
        .layer(DefaultBodyLimit::max(config.max_request_body_bytes()))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
