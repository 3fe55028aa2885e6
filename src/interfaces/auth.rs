//! `x-api-key` auth middleware (§4.10: "all require `x-api-key` header
//! equal to configured value; unauthenticated → 401").

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == state.api_key.as_ref() => Ok(next.run(req).await),
        _ => Err(ApiError::Unauthorized),
    }
}
