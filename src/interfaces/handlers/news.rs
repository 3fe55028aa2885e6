//! `/news/latest`, `/news/by-ticker` (§4.10).

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::errors::ValidationError;
use crate::domain::model::Article;
use crate::domain::ticker::normalize_ticker;
use crate::interfaces::error::ApiError;
use crate::interfaces::state::AppState;

const MAX_LIMIT: i64 = 500;
const DEFAULT_LIMIT: i64 = 50;
const SNIPPET_LEN: usize = 220;

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ValidationError::InvalidLimit { limit, max: MAX_LIMIT }.into());
    }
    Ok(limit)
}

#[derive(Serialize)]
struct ArticleRow {
    url: String,
    title: String,
    source: String,
    published_at: Option<DateTime<Utc>>,
    snippet: String,
    tickers: Vec<String>,
}

async fn build_rows(state: &AppState, articles: Vec<Article>) -> Result<Vec<ArticleRow>, ApiError> {
    let urls: Vec<String> = articles.iter().map(|a| a.url.clone()).collect();
    let links = state.articles.tickers_for(&urls).await?;

    let mut rows = Vec::with_capacity(articles.len());
    for a in articles {
        let snippet = a
            .text
            .as_deref()
            .map(|t| t.chars().take(SNIPPET_LEN).collect::<String>())
            .unwrap_or_default();
        let tickers: Vec<String> = links
            .iter()
            .filter(|l| l.article_url == a.url)
            .map(|l| l.ticker.clone())
            .collect();
        rows.push(ArticleRow {
            url: a.url,
            title: a.title,
            source: a.source,
            published_at: a.published_at,
            snippet,
            tickers,
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
pub struct NewsLatestQuery {
    limit: Option<i64>,
    #[serde(rename = "beforePublishedAt")]
    before_published_at: Option<DateTime<Utc>>,
    #[serde(rename = "beforeUrl")]
    before_url: Option<String>,
}

pub async fn news_latest(
    State(state): State<AppState>,
    Query(q): Query<NewsLatestQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(q.limit)?;
    let articles = state
        .articles
        .query_latest(limit, q.before_published_at, q.before_url.as_deref())
        .await?;
    let next_cursor = next_cursor_of(&articles);
    let rows = build_rows(&state, articles).await?;

    Ok(Json(json!({
        "ok": true,
        "count": rows.len(),
        "rows": rows,
        "nextCursor": next_cursor,
    })))
}

#[derive(Debug, Deserialize)]
pub struct NewsByTickerQuery {
    ticker: String,
    limit: Option<i64>,
    #[serde(rename = "beforePublishedAt")]
    before_published_at: Option<DateTime<Utc>>,
    #[serde(rename = "beforeUrl")]
    before_url: Option<String>,
}

pub async fn news_by_ticker(
    State(state): State<AppState>,
    Query(q): Query<NewsByTickerQuery>,
) -> Result<Json<Value>, ApiError> {
    let ticker = normalize_ticker(&q.ticker);
    if ticker.is_empty() {
        return Err(ValidationError::InvalidTicker { ticker: q.ticker }.into());
    }
    let limit = parse_limit(q.limit)?;
    let articles = state
        .articles
        .query_by_ticker(&ticker, limit, q.before_published_at, q.before_url.as_deref())
        .await?;
    let next_cursor = next_cursor_of(&articles);
    let rows = build_rows(&state, articles).await?;

    Ok(Json(json!({
        "ok": true,
        "ticker": ticker,
        "count": rows.len(),
        "rows": rows,
        "nextCursor": next_cursor,
    })))
}

fn next_cursor_of(articles: &[Article]) -> Option<Value> {
    let last = articles.last()?;
    Some(json!({"beforePublishedAt": last.published_at, "beforeUrl": last.url}))
}
