//! `/candles`, `/latest`, `/top-movers` (§4.10, §6).

use std::str::FromStr;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::ValidationError;
use crate::domain::model::Timeframe;
use crate::domain::ticker::normalize_ticker;
use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

const MAX_LIMIT: i64 = 2000;
const DEFAULT_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    ticker: String,
    tf: String,
    #[serde(rename = "beforeTs")]
    before_ts: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct CandleRow {
    ts: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<f64>,
    source: Option<String>,
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ValidationError::InvalidLimit { limit, max: MAX_LIMIT }.into());
    }
    Ok(limit)
}

pub async fn candles(
    State(state): State<AppState>,
    Query(q): Query<CandlesQuery>,
) -> Result<Json<Value>, ApiError> {
    let ticker = normalize_ticker(&q.ticker);
    if ticker.is_empty() {
        return Err(ValidationError::InvalidTicker { ticker: q.ticker }.into());
    }
    let tf = Timeframe::from_str(&q.tf)?;
    let limit = parse_limit(q.limit)?;

    let rows = state.candles.query_candles(&ticker, tf, q.before_ts, limit).await?;
    let rows: Vec<CandleRow> = rows
        .into_iter()
        .map(|c| CandleRow { ts: c.ts_ms, o: c.o, h: c.h, l: c.l, c: c.c, v: c.v, source: c.source })
        .collect();

    Ok(Json(json!({
        "ok": true,
        "ticker": ticker,
        "tf": tf.as_str(),
        "count": rows.len(),
        "rows": rows,
    })))
}

#[derive(Serialize)]
struct LatestRow {
    ticker: String,
    tf: &'static str,
    ts: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<f64>,
    source: Option<String>,
    ingested_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    tf: String,
    limit: Option<i64>,
}

pub async fn latest(
    State(state): State<AppState>,
    Query(q): Query<LatestQuery>,
) -> Result<Json<Value>, ApiError> {
    let tf = Timeframe::from_str(&q.tf)?;
    let limit = parse_limit(q.limit)?;
    let rows = state.candles.query_latest(tf, limit).await?;
    let rows: Vec<LatestRow> = rows
        .into_iter()
        .map(|c| LatestRow {
            ticker: c.ticker,
            tf: tf.as_str(),
            ts: c.ts_ms,
            o: c.o,
            h: c.h,
            l: c.l,
            c: c.c,
            v: c.v,
            source: c.source,
            ingested_at: c.ingested_at,
        })
        .collect();

    Ok(Json(json!({
        "ok": true,
        "tf": tf.as_str(),
        "count": rows.len(),
        "rows": rows,
    })))
}

#[derive(Serialize)]
struct TopMoverRow {
    ticker: String,
    tf: &'static str,
    ts_latest: i64,
    close_latest: f64,
    close_prev: Option<f64>,
    pct_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct TopMoversQuery {
    tf: String,
    limit: Option<i64>,
}

pub async fn top_movers(
    State(state): State<AppState>,
    Query(q): Query<TopMoversQuery>,
) -> Result<Json<Value>, ApiError> {
    let tf = Timeframe::from_str(&q.tf)?;
    let limit = parse_limit(q.limit)?;
    let rows = state.candles.query_top_movers(tf, limit).await?;
    let rows: Vec<TopMoverRow> = rows
        .into_iter()
        .map(|m| TopMoverRow {
            ticker: m.ticker,
            tf: tf.as_str(),
            ts_latest: m.ts_latest,
            close_latest: m.close_latest,
            close_prev: m.close_prev,
            pct_change: m.pct_change,
        })
        .collect();

    Ok(Json(json!({
        "ok": true,
        "tf": tf.as_str(),
        "count": rows.len(),
        "rows": rows,
    })))
}
