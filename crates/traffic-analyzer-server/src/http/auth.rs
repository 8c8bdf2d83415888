//! Fixed API-key header authentication. Production mode rejects every
//! request when no key is configured at all; non-production allows
//! unauthenticated access when no key is configured, for local development.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::http::AppState;

pub const API_KEY_HEADER: &str = "X-Api-Key";

pub async fn require_api_key(State(state): State<AppState>, headers: HeaderMap, request: Request, next: Next) -> Result<Response, AppError> {
    match &state.config.api_key {
        Some(expected) => {
            let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            if provided != Some(expected.as_str()) {
                return Err(AppError::AuthFailed);
            }
        }
        None if state.config.production_mode => return Err(AppError::AuthFailed),
        None => {}
    }
    Ok(next.run(request).await)
}
