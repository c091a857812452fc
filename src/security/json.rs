use axum::{
    async_trait,
    body::{Body, to_bytes},
    extract::{FromRequest, Request},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Deserializer;

use crate::errors::AppError;

pub const MAX_JSON_BODY_BYTES: usize = 64 * 1024; // 64 KiB upper bound for JSON bodies

/// JSON body extractor that reports the failing field path and rejects
/// trailing data. Every failure is an `AppError::Validation`.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

fn parsing_error(err: serde_path_to_error::Error<serde_json::Error>) -> AppError {
    let path = err.path().to_string();
    let error = err.into_inner();
    if path.is_empty() || path == "." {
        AppError::Validation(format!("failed to parse JSON payload: {error}"))
    } else {
        AppError::Validation(format!("failed to parse JSON payload at {path}: {error}"))
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<Body>, _state: &S) -> Result<Self, Self::Rejection> {
        ensure_json_content_type(req.headers())?;

        let body_bytes = to_bytes(req.into_body(), MAX_JSON_BODY_BYTES)
            .await
            .map_err(|err| AppError::Validation(format!("failed to read request body: {err}")))?;

        let mut deserializer = Deserializer::from_slice(body_bytes.as_ref());
        let value = serde_path_to_error::deserialize(&mut deserializer).map_err(parsing_error)?;

        deserializer
            .end()
            .map_err(|err| AppError::Validation(format!("unexpected trailing data: {err}")))?;

        Ok(ValidatedJson(value))
    }
}

fn ensure_json_content_type(headers: &HeaderMap) -> Result<(), AppError> {
    let value = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());

    if let Some(value) = value
        && (value.starts_with("application/json") || value.ends_with("+json"))
    {
        return Ok(());
    }

    Err(AppError::Validation(format!(
        "expected application/json payload, received {}",
        value.unwrap_or("none")
    )))
}
