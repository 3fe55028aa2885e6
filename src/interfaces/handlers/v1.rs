//! Optional versioned composed-dashboard endpoints (SPEC_FULL.md §11):
//! `/v1/overall/health`, `/v1/analytics/overview`, `/v1/context/:ticker`.
//! Thin reads over the same repositories the unversioned endpoints use -
//! no new write paths, no new invariants.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::domain::model::RepairStatus;
use crate::domain::ticker::normalize_ticker;
use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

/// Repair-queue depth plus frontier lag (§5 "Back-pressure": "queued count
/// grows and is visible via `/v1/overall/health`").
pub async fn overall_health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let queued = state.repair_queue.queue_depth(RepairStatus::Queued).await?;
    let running = state.repair_queue.queue_depth(RepairStatus::Running).await?;
    let error = state.repair_queue.queue_depth(RepairStatus::Error).await?;
    let stats = state.derived.get_market_stats().await?;

    Ok(Json(json!({
        "ok": true,
        "repair_queue": {"queued": queued, "running": running, "error": error},
        "candles_coverage_pct": stats.as_ref().map(|s| s.candles_coverage_pct),
        "frontier_lag_ms": stats.as_ref().and_then(|s| s.frontier_lag_ms),
    })))
}

/// The last `market_stats` rebuild, composed for a dashboard landing page.
pub async fn analytics_overview(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.derived.get_market_stats().await?;
    Ok(Json(json!({
        "ok": true,
        "market_stats": stats,
    })))
}

/// `symbol_context_latest` for one ticker.
pub async fn context(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ticker = normalize_ticker(&ticker);
    if ticker.is_empty() {
        return Err(crate::domain::errors::ValidationError::InvalidTicker { ticker }.into());
    }
    let ctx = state.derived.get_context(&ticker).await?;
    match ctx {
        Some(c) => Ok(Json(json!({"ok": true, "context": c}))),
        None => Err(crate::domain::errors::NotFoundError::Ticker { ticker }.into()),
    }
}
