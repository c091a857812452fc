use axum::{Extension, Json, Router, middleware, routing::post};
use serde::Deserialize;

use crate::errors::AppError;
use crate::security::json::ValidatedJson;
use crate::security::rate_limit::throttle_logins;
use crate::services::users::LoginResponse;
use crate::state::AppState;

pub fn router() -> Router {
    Router::new().route(
        "/users/login",
        post(login).layer(middleware::from_fn(throttle_logins)),
    )
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    username: String,
}

pub async fn login(
    Extension(state): Extension<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::Validation("username is required".to_string()));
    }

    let response = state.logins.login(&payload.username).await?;
    Ok(Json(response))
}
