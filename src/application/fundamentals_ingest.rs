//! Fundamentals ingest (C9, §4.9): per-`(ticker, period)` fan-out fetch
//! across statement endpoints, block-hash change detection, normalization
//! to point rows, and a `publish/latest.json` aggregation step.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::join_all;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::FundamentalsConfig;
use crate::domain::hashing::block_hash;
use crate::domain::model::{FiLatestRow, FiPointRow, Period, Statement};
use crate::domain::repositories::FundamentalsRepository;
use crate::infra::source_client::{CallOptions, SourceClient};

/// Endpoints fanned out in parallel per `(ticker, period)` (§4.9).
const ENDPOINTS: &[&str] = &[
    "periodSelect",
    "structureOverview",
    "aggCompareOverview",
    "is",
    "bs",
    "cf",
    "ratio",
];

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub tickers_processed: u32,
    pub blocks_changed: u32,
    pub blocks_unchanged: u32,
    pub errors: Vec<String>,
}

pub struct FundamentalsIngestWorker {
    pub config: FundamentalsConfig,
    pub client: SourceClient,
    pub repo: Arc<dyn FundamentalsRepository>,
}

impl FundamentalsIngestWorker {
    pub fn new(config: FundamentalsConfig, client: SourceClient, repo: Arc<dyn FundamentalsRepository>) -> Self {
        Self { config, client, repo }
    }

    /// Runs one full pass over `tickers`, bounded to `config.concurrency`
    /// in-flight `(ticker, period)` jobs at a time, then publishes the
    /// aggregate snapshot (§4.9 "The publish step").
    pub async fn run(&self, tickers: &[String]) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        let period = if self.config.should_fallback_to_quarterly() {
            Period::Q
        } else {
            Period::Y
        };

        for chunk in tickers.chunks(self.config.concurrency.max(1)) {
            let futures = chunk.iter().map(|ticker| self.process_ticker(ticker, period));
            let results = join_all(futures).await;
            for (ticker, result) in chunk.iter().zip(results) {
                match result {
                    Ok(changed) => {
                        summary.tickers_processed += 1;
                        if changed {
                            summary.blocks_changed += 1;
                        } else {
                            summary.blocks_unchanged += 1;
                        }
                    }
                    Err(e) => {
                        warn!(ticker, error = %e, "fundamentals ingest failed for ticker");
                        summary.errors.push(format!("{ticker}: {e}"));
                    }
                }
            }
        }

        if let Err(e) = self.publish(tickers, period) {
            warn!(error = %e, "publish step failed");
            summary.errors.push(format!("publish: {e}"));
        }

        info!(
            processed = summary.tickers_processed,
            changed = summary.blocks_changed,
            "fundamentals ingest pass complete"
        );
        Ok(summary)
    }

    /// Fetches every endpoint for `(ticker, period)`, composes a single
    /// block, hashes it, and - only if the hash changed - normalizes and
    /// persists. Returns whether the block changed.
    async fn process_ticker(&self, ticker: &str, period: Period) -> Result<bool> {
        let mut block = serde_json::Map::new();
        for endpoint in ENDPOINTS {
            let url = format!(
                "{}/{endpoint}?ticker={ticker}&period={}",
                self.config.source_base_url.trim_end_matches('/'),
                period.as_str()
            );
            let opts = CallOptions {
                bearer_token: self.config.bearer_token.clone(),
                ..Default::default()
            };
            let response = self.client.get(&url, &opts).await.with_context(|| format!("fetching {endpoint}"))?;
            let value = response.json.unwrap_or(Value::Null);
            block.insert((*endpoint).to_string(), value);
        }
        let block = Value::Object(block);

        self.write_raw_latest(ticker, period, &block)?;

        let new_hash = block_hash(&block);
        let last_hash = self.repo.last_block_hash(ticker, period).await?;
        let changed = last_hash.as_deref() != Some(new_hash.as_str());

        if !changed {
            return Ok(false);
        }

        self.write_snapshot(ticker, period, &block)?;

        let fetched_at = Utc::now();
        let points = normalize_block(ticker, period, &block, fetched_at);
        self.append_ndjson(ticker, period, &points)?;

        for point in &points {
            self.repo.upsert_fi_point(point).await?;
        }

        let latest_rows: Vec<FiLatestRow> = points
            .iter()
            .map(|p| FiLatestRow {
                ticker: p.ticker.clone(),
                period: p.period,
                statement: p.statement,
                period_date: Some(p.period_date),
                metric: p.metric.clone(),
                value: p.value,
                fetched_at: p.fetched_at,
                ingested_at: Utc::now(),
            })
            .collect();
        self.repo.replace_fi_latest(&latest_rows).await?;
        self.repo.set_last_block_hash(ticker, period, &new_hash).await?;

        Ok(true)
    }

    fn write_raw_latest(&self, ticker: &str, period: Period, block: &Value) -> Result<()> {
        let path = PathBuf::from(&self.config.out_dir).join(format!("{ticker}_{}_latest.json", period.as_str()));
        write_temp_rename(&path, &serde_json::to_vec_pretty(block)?)
    }

    fn write_snapshot(&self, ticker: &str, period: Period, block: &Value) -> Result<()> {
        let day = Utc::now().format("%Y-%m-%d");
        let path = PathBuf::from(&self.config.out_dir)
            .join(day.to_string())
            .join(format!("{ticker}_{}_{}.json", period.as_str(), Utc::now().timestamp_millis()));
        write_temp_rename(&path, &serde_json::to_vec_pretty(block)?)
    }

    fn append_ndjson(&self, ticker: &str, period: Period, points: &[FiPointRow]) -> Result<()> {
        let path = PathBuf::from("normalized").join(format!("{ticker}_{}.ndjson", period.as_str()));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        for point in points {
            let line = serde_json::to_string(point)?;
            writeln!(f, "{line}")?;
        }
        Ok(())
    }

    /// Aggregates every `raw/{ticker}_{period}_latest.json` this run touched
    /// into `publish/latest.json`, keyed `"ticker:period"` (§4.9).
    fn publish(&self, tickers: &[String], period: Period) -> Result<()> {
        let mut aggregate = serde_json::Map::new();
        for ticker in tickers {
            let path = PathBuf::from(&self.config.out_dir).join(format!("{ticker}_{}_latest.json", period.as_str()));
            if let Ok(bytes) = fs::read(&path)
                && let Ok(value) = serde_json::from_slice::<Value>(&bytes)
            {
                aggregate.insert(format!("{ticker}:{}", period.as_str()), value);
            }
        }
        let path = PathBuf::from("publish").join("latest.json");
        write_temp_rename(&path, &serde_json::to_vec_pretty(&Value::Object(aggregate))?)
    }
}

fn write_temp_rename(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    let mut f = fs::File::create(&tmp_path)?;
    f.write_all(body)?;
    f.sync_all().ok();
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Flattens a composed block into numeric point rows (§4.9 step 6:
/// "Normalization"). Only statements with a numeric-metric regex match
/// (`^(is|bs|cf|r|ratio)\d+$`) are emitted; non-numeric fields (e.g. a
/// `foo` string field) are dropped.
fn normalize_block(
    ticker: &str,
    period: Period,
    block: &Value,
    fetched_at: chrono::DateTime<Utc>,
) -> Vec<FiPointRow> {
    let metric_re = Regex::new(r"^(is|bs|cf|r|ratio)\d+$").expect("valid regex literal");
    let statements: &[(&str, Statement)] = &[
        ("is", Statement::Is),
        ("bs", Statement::Bs),
        ("cf", Statement::Cf),
        ("ratio", Statement::Ratio),
    ];

    let mut rows = Vec::new();
    for (key, statement) in statements {
        let Some(items) = block.get(*key).and_then(|v| v.get("items")).and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items {
            let Some(obj) = item.as_object() else { continue };
            let period_date = obj
                .get("periodDate")
                .and_then(|v| v.as_str())
                .and_then(parse_period_date)
                .unwrap_or_else(|| fetched_at.date_naive());
            let period_date_name = obj.get("periodDateName").and_then(|v| v.as_str()).map(str::to_string);

            let metrics: BTreeMap<&String, &Value> = obj.iter().collect();
            for (metric, value) in metrics {
                if !metric_re.is_match(metric) {
                    continue;
                }
                let numeric = value.as_f64();
                rows.push(FiPointRow {
                    ticker: ticker.to_string(),
                    period,
                    statement: *statement,
                    period_date,
                    period_date_name: period_date_name.clone(),
                    metric: metric.clone(),
                    value: numeric,
                    fetched_at,
                });
            }
        }
    }
    rows
}

/// Parses `"YYYY-MM"` period dates to the first of that month; anything
/// else falls back to `None` so the caller uses `fetched_at`'s date.
fn parse_period_date(s: &str) -> Option<chrono::NaiveDate> {
    let full = format!("{s}-01");
    chrono::NaiveDate::parse_from_str(&full, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_block_keeps_numeric_metrics_and_drops_others() {
        let block = json!({
            "is": {
                "items": [
                    {"periodDate": "2025-12", "periodDateName": "Q4/2025", "is1": 10, "is2": 20, "foo": "bar"}
                ]
            }
        });
        let rows = normalize_block("FPT", Period::Q, &block, Utc::now());
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.metric == "is1" || r.metric == "is2"));
        assert!(rows.iter().all(|r| r.statement == Statement::Is));
        let is1 = rows.iter().find(|r| r.metric == "is1").unwrap();
        assert_eq!(is1.value, Some(10.0));
        assert_eq!(is1.period_date_name.as_deref(), Some("Q4/2025"));
    }

    #[test]
    fn normalize_block_handles_missing_statement_sections() {
        let block = json!({"periodSelect": {"ok": true}});
        let rows = normalize_block("FPT", Period::Y, &block, Utc::now());
        assert!(rows.is_empty());
    }

    #[test]
    fn parse_period_date_parses_year_month() {
        let d = parse_period_date("2025-12").unwrap();
        assert_eq!(d.to_string(), "2025-12-01");
    }
}
