//! `GET /healthz` (§4.10: `SELECT 1`; `{ok:true, db:1}` or 500
//! `db_unreachable`).

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

pub async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|e| ApiError::Internal(format!("db_unreachable: {e}")))?;
    Ok(Json(json!({"ok": true, "db": 1})))
}
