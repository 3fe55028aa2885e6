//! `/fundamentals/latest`, `/screener` (§4.10).

use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::errors::ValidationError;
use crate::domain::model::{Period, Statement};
use crate::domain::ticker::normalize_ticker;
use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 200;

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ValidationError::InvalidLimit { limit, max: MAX_LIMIT }.into());
    }
    Ok(limit)
}

#[derive(Debug, Deserialize)]
pub struct FundamentalsLatestQuery {
    ticker: String,
    #[serde(default = "default_period")]
    period: String,
    statement: Option<String>,
    limit: Option<i64>,
}

fn default_period() -> String {
    "Q".to_string()
}

pub async fn fundamentals_latest(
    State(state): State<AppState>,
    Query(q): Query<FundamentalsLatestQuery>,
) -> Result<Json<Value>, ApiError> {
    let ticker = normalize_ticker(&q.ticker);
    if ticker.is_empty() {
        return Err(ValidationError::InvalidTicker { ticker: q.ticker }.into());
    }
    let period = Period::from_str(&q.period)?;
    let statement = q.statement.as_deref().map(Statement::from_str).transpose()?;
    let limit = parse_limit(q.limit)?;

    let rows = state.fundamentals.query_latest(&ticker, period, statement, limit).await?;

    Ok(Json(json!({
        "ok": true,
        "ticker": ticker,
        "period": period.as_str(),
        "statement": statement.map(|s| s.as_str()),
        "count": rows.len(),
        "rows": rows,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScreenerQuery {
    metric: String,
    period: String,
    statement: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    limit: Option<i64>,
}

pub async fn screener(
    State(state): State<AppState>,
    Query(q): Query<ScreenerQuery>,
) -> Result<Json<Value>, ApiError> {
    let period = Period::from_str(&q.period)?;
    let statement = q.statement.as_deref().map(Statement::from_str).transpose()?;
    let limit = parse_limit(q.limit)?;

    let rows = state
        .fundamentals
        .screener(&q.metric, period, statement, q.min, q.max, limit)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "metric": q.metric,
        "period": period.as_str(),
        "statement": statement.map(|s| s.as_str()),
        "count": rows.len(),
        "rows": rows,
    })))
}
