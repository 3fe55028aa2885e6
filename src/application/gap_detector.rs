//! Gap detector + repair worker (C6, §4.6). `GapDetector::scan` emits one
//! `candle_repair_queue` entry per contiguous missing window; `RepairWorker
//! ::run_once` dequeues queued entries in FIFO order and re-fetches them
//! through the same `CandleSource` the ingest worker uses.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tracing::{info, warn};

use crate::application::candle_source::CandleSource;
use crate::application::lease_coordinator::{self, ClaimOutcome};
use crate::config::GapRepairConfig;
use crate::domain::calendar;
use crate::domain::errors::CoordinationError;
use crate::domain::model::{RepairStatus, Timeframe};
use crate::domain::repositories::{CandleRepository, LeaseRepository, RepairQueueRepository};
use crate::infra::repositories::load_universe_from_symbols;
use crate::infra::shard_cache::load_universe_from_file;

/// Generates the expected-bar timestamp grid for `(tf, date)`: the full
/// day grid for `1d`, or the intraday session minutes (lunch excluded)
/// for `15m`/`1h` (resolved Open Question, SPEC_FULL.md §10).
fn expected_ts_for_day(tf: Timeframe, date: chrono::NaiveDate) -> Vec<i64> {
    if !calendar::is_trading_day(date) {
        return vec![];
    }
    let midnight_ms = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight always valid"))
        .timestamp_millis();

    match tf {
        Timeframe::D1 => vec![midnight_ms],
        Timeframe::H1 | Timeframe::M15 => {
            let step = tf.grid_minutes();
            let mut out = Vec::new();
            for (open_min, close_min) in calendar::intraday_session_ranges() {
                let mut m = open_min;
                while m < close_min {
                    out.push(midnight_ms + m * 60_000);
                    m += step;
                }
            }
            out
        }
    }
}

/// One contiguous run of missing expected bars.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingWindow {
    pub start_ms: i64,
    pub end_ms: i64,
    pub expected_bars: i32,
}

/// Diffs `expected` (sorted ascending) against `present` (any order),
/// returning contiguous missing runs as `[start, end]` windows.
pub fn find_missing_windows(expected: &[i64], present: &[i64]) -> Vec<MissingWindow> {
    use std::collections::HashSet;
    let present: HashSet<i64> = present.iter().copied().collect();

    let mut windows = Vec::new();
    let mut run_start: Option<i64> = None;
    let mut run_count = 0i32;
    let mut prev_ts: Option<i64> = None;

    for &ts in expected {
        if present.contains(&ts) {
            if let Some(start) = run_start.take() {
                windows.push(MissingWindow {
                    start_ms: start,
                    end_ms: prev_ts.unwrap_or(start),
                    expected_bars: run_count,
                });
                run_count = 0;
            }
        } else {
            if run_start.is_none() {
                run_start = Some(ts);
            }
            run_count += 1;
        }
        prev_ts = Some(ts);
    }
    if let Some(start) = run_start {
        windows.push(MissingWindow {
            start_ms: start,
            end_ms: prev_ts.unwrap_or(start),
            expected_bars: run_count,
        });
    }
    windows
}

pub struct GapDetector {
    pub candle_repo: Arc<dyn CandleRepository>,
    pub repair_queue: Arc<dyn RepairQueueRepository>,
}

impl GapDetector {
    /// Scans `ticker`/`tf` over `[lookback_start, lookback_end]` (inclusive
    /// calendar dates) and enqueues one repair-queue entry per missing
    /// window found (§4.6).
    pub async fn scan_ticker_tf(
        &self,
        ticker: &str,
        tf: Timeframe,
        lookback_start: chrono::NaiveDate,
        lookback_end: chrono::NaiveDate,
    ) -> Result<usize> {
        let mut expected = Vec::new();
        let mut date = lookback_start;
        while date <= lookback_end {
            expected.extend(expected_ts_for_day(tf, date));
            date = date.succ_opt().expect("date arithmetic in range");
        }
        if expected.is_empty() {
            return Ok(0);
        }

        let start_ms = *expected.first().unwrap();
        let end_ms = *expected.last().unwrap() + tf.grid_ms();
        let present_rows = self
            .candle_repo
            .query_candles(ticker, tf, Some(end_ms), expected.len() as i64 * 2 + 1)
            .await?;
        let present: Vec<i64> = present_rows
            .into_iter()
            .map(|c| c.ts_ms)
            .filter(|ts| *ts >= start_ms)
            .collect();

        let windows = find_missing_windows(&expected, &present);
        for w in &windows {
            self.repair_queue
                .enqueue(ticker, tf, w.start_ms, w.end_ms, w.expected_bars)
                .await?;
        }
        Ok(windows.len())
    }
}

pub struct RepairWorker {
    pub repair_queue: Arc<dyn RepairQueueRepository>,
    pub candle_repo: Arc<dyn CandleRepository>,
    pub source: Arc<dyn CandleSource>,
}

impl RepairWorker {
    /// Dequeues up to `limit` `queued` entries and re-fetches each window
    /// (§4.6: "moves a row to running, performs the fetch+upsert, then to
    /// done or error"). Writes one `candle_repairs` audit row per attempt.
    pub async fn run_once(&self, limit: i64) -> Result<(u64, u64)> {
        let entries = self.repair_queue.dequeue_batch(limit).await?;
        let (mut done, mut errored) = (0u64, 0u64);

        for entry in entries {
            match self
                .source
                .fetch_page(
                    &entry.ticker,
                    entry.tf,
                    entry.window_start_ms,
                    (entry.expected_bars as i64).max(1),
                )
                .await
            {
                Ok(bars) => {
                    let valid: Vec<_> = bars.into_iter().filter(|c| c.is_valid()).collect();
                    let missing_count = entry.expected_bars - valid.len() as i32;
                    if let Err(e) = self.candle_repo.upsert_candles(&valid).await {
                        errored += 1;
                        self.repair_queue
                            .set_status(entry.id, RepairStatus::Error, Some(&truncate(&e.to_string())))
                            .await?;
                        continue;
                    }
                    self.repair_queue
                        .record_repair(
                            &entry.ticker,
                            entry.tf,
                            entry.window_start_ms,
                            entry.window_end_ms,
                            missing_count.max(0),
                        )
                        .await?;
                    self.repair_queue
                        .set_status(entry.id, RepairStatus::Done, None)
                        .await?;
                    done += 1;
                    info!(ticker = %entry.ticker, tf = %entry.tf, "repair window filled");
                }
                Err(e) => {
                    errored += 1;
                    warn!(ticker = %entry.ticker, error = %e, "repair fetch failed");
                    self.repair_queue
                        .set_status(entry.id, RepairStatus::Error, Some(&truncate(&e.to_string())))
                        .await?;
                }
            }
        }
        Ok((done, errored))
    }
}

#[derive(Debug, Default)]
pub struct GapRepairSummary {
    pub status: &'static str,
    pub windows_enqueued: usize,
    pub repairs_done: u64,
    pub repairs_errored: u64,
}

/// Top-level orchestration for the `gap-repair` binary: claims the shard
/// lease, scans every `(ticker, tf)` in this shard's universe over the
/// configured lookback, then drains the repair queue once (§4.6).
pub struct GapRepairRun {
    pub config: GapRepairConfig,
    pub pool: sqlx::postgres::PgPool,
    pub lease_repo: Arc<dyn LeaseRepository>,
    pub detector: GapDetector,
    pub repair_worker: RepairWorker,
}

impl GapRepairRun {
    pub async fn run(&self) -> Result<GapRepairSummary> {
        let claim = match lease_coordinator::claim_shard(
            self.lease_repo.clone(),
            &self.config.job_name,
            self.config.shard_index,
            &self.config.node_id,
            self.config.lease_ms,
            self.config.stale_minutes,
            None,
        )
        .await
        {
            Ok(claim) => claim,
            Err(CoordinationError::Unavailable { reason }) => {
                warn!(
                    job = %self.config.job_name,
                    shard = self.config.shard_index,
                    skipped = "lease_error",
                    reason,
                    "lease coordinator unreachable; skipping run without writes"
                );
                return Ok(GapRepairSummary {
                    status: "skipped",
                    ..Default::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let lease = match claim {
            ClaimOutcome::Skipped => {
                return Ok(GapRepairSummary { status: "skipped", ..Default::default() });
            }
            ClaimOutcome::Claimed(lease) => lease,
        };

        let universe = self.load_universe().await?;
        let shard_universe = crate::application::shard_router::universe_for_shard(
            &universe,
            self.config.shard_count,
            self.config.shard_index,
        );

        let today = Utc::now().date_naive();
        let lookback_start = today - ChronoDuration::days(self.config.lookback_days);

        let mut summary = GapRepairSummary { status: "ok", ..Default::default() };

        for ticker in &shard_universe {
            if lease.lost_ownership() {
                warn!(job = %self.config.job_name, "lease lost mid-scan; stopping");
                summary.status = "error";
                break;
            }
            for &tf in &Timeframe::ALL {
                match self.detector.scan_ticker_tf(ticker, tf, lookback_start, today).await {
                    Ok(n) => summary.windows_enqueued += n,
                    Err(e) => warn!(ticker, tf = %tf, error = %e, "gap scan failed"),
                }
            }
            if let Err(e) = lease.report_progress().await {
                warn!(error = %e, "report_progress failed");
                summary.status = "error";
                break;
            }
        }

        let (done, errored) = self.repair_worker.run_once(self.config.queue_batch_size).await?;
        summary.repairs_done = done;
        summary.repairs_errored = errored;
        Ok(summary)
    }

    async fn load_universe(&self) -> Result<Vec<String>> {
        match &self.config.universe_path {
            Some(path) => load_universe_from_file(&std::path::PathBuf::from(path)),
            None => load_universe_from_symbols(&self.pool, Some("active = true")).await,
        }
    }
}

/// Truncated error message for `candle_repair_queue.last_error` (§7:
/// "beyond that... recorded against the row (fetch_status=failed with
/// truncated error)").
fn truncate(s: &str) -> String {
    const MAX: usize = 500;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(MAX).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_contiguous_gap() {
        let expected = vec![1, 2, 3, 4, 5];
        let present = vec![1, 2, 5];
        let windows = find_missing_windows(&expected, &present);
        assert_eq!(
            windows,
            vec![MissingWindow {
                start_ms: 3,
                end_ms: 4,
                expected_bars: 2
            }]
        );
    }

    #[test]
    fn finds_multiple_disjoint_gaps() {
        let expected = vec![1, 2, 3, 4, 5, 6, 7];
        let present = vec![1, 4, 7];
        let windows = find_missing_windows(&expected, &present);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_ms, 2);
        assert_eq!(windows[0].end_ms, 3);
        assert_eq!(windows[1].start_ms, 5);
        assert_eq!(windows[1].end_ms, 6);
    }

    #[test]
    fn no_gaps_when_fully_present() {
        let expected = vec![1, 2, 3];
        let present = vec![1, 2, 3];
        assert!(find_missing_windows(&expected, &present).is_empty());
    }

    #[test]
    fn daily_grid_is_one_bar_per_trading_day() {
        let d = chrono::NaiveDate::from_ymd_opt(2025, 9, 4).unwrap();
        assert_eq!(expected_ts_for_day(Timeframe::D1, d).len(), 1);
    }

    #[test]
    fn weekend_has_no_expected_bars() {
        let d = chrono::NaiveDate::from_ymd_opt(2025, 9, 6).unwrap();
        assert!(expected_ts_for_day(Timeframe::D1, d).is_empty());
        assert!(expected_ts_for_day(Timeframe::M15, d).is_empty());
    }

    #[test]
    fn intraday_grid_excludes_lunch_break() {
        let d = chrono::NaiveDate::from_ymd_opt(2025, 9, 4).unwrap();
        let bars = expected_ts_for_day(Timeframe::M15, d);
        // 09:00-11:30 (10 bars) + 13:00-15:00 (8 bars) = 18 bars, 15m grid.
        assert_eq!(bars.len(), 18);
    }

    #[test]
    fn truncate_caps_long_error_messages() {
        let long = "x".repeat(1000);
        assert!(truncate(&long).len() <= 503);
    }

    #[test]
    fn truncate_does_not_panic_on_multibyte_utf8() {
        let long = "không có dữ liệu ".repeat(100);
        let out = truncate(&long);
        assert!(out.ends_with("..."));
    }
}
