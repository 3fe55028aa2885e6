//! `/corporate-actions/latest`, `/corporate-actions/by-ticker` (§4.10, §6).

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::errors::ValidationError;
use crate::domain::model::CorporateAction;
use crate::domain::ticker::normalize_ticker;
use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

const MAX_LIMIT: i64 = 500;
const DEFAULT_LIMIT: i64 = 50;

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ValidationError::InvalidLimit { limit, max: MAX_LIMIT }.into());
    }
    Ok(limit)
}

fn next_cursor_of(rows: &[CorporateAction]) -> Option<Value> {
    let last = rows.last()?;
    Some(json!({"beforeExDate": last.ex_date, "beforeId": last.id}))
}

#[derive(Debug, Deserialize)]
pub struct CorporateActionsLatestQuery {
    limit: Option<i64>,
    #[serde(rename = "beforeExDate")]
    before_ex_date: Option<NaiveDate>,
    #[serde(rename = "beforeId")]
    before_id: Option<i64>,
}

pub async fn latest(
    State(state): State<AppState>,
    Query(q): Query<CorporateActionsLatestQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(q.limit)?;
    let rows = state
        .corporate_actions
        .query_latest(limit, q.before_ex_date, q.before_id)
        .await?;
    let next_cursor = next_cursor_of(&rows);

    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "rows": rows,
        "nextCursor": next_cursor,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CorporateActionsByTickerQuery {
    ticker: String,
    limit: Option<i64>,
    #[serde(rename = "beforeExDate")]
    before_ex_date: Option<NaiveDate>,
    #[serde(rename = "beforeId")]
    before_id: Option<i64>,
}

pub async fn by_ticker(
    State(state): State<AppState>,
    Query(q): Query<CorporateActionsByTickerQuery>,
) -> Result<Json<Value>, ApiError> {
    let ticker = normalize_ticker(&q.ticker);
    if ticker.is_empty() {
        return Err(ValidationError::InvalidTicker { ticker: q.ticker }.into());
    }
    let limit = parse_limit(q.limit)?;
    let rows = state
        .corporate_actions
        .query_by_ticker(&ticker, limit, q.before_ex_date, q.before_id)
        .await?;
    let next_cursor = next_cursor_of(&rows);

    Ok(Json(json!({
        "ok": true,
        "ticker": ticker,
        "count": rows.len(),
        "rows": rows,
        "nextCursor": next_cursor,
    })))
}
