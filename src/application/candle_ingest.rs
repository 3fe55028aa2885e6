//! Candle ingest worker (C5, §4.5): the fleet's main scheduled job. One
//! invocation claims its shard's lease, resolves this run's ticker batch,
//! walks each ticker x timeframe forward in pages until the source's
//! frontier or the run's wall-clock budget is reached, and advances the
//! shard cursor only after every write in the batch has committed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

use sqlx::postgres::PgPool;

use crate::application::candle_source::CandleSource;
use crate::application::lease_coordinator::{self, ClaimOutcome};
use crate::application::shard_router;
use crate::config::CandleIngestConfig;
use crate::domain::errors::CoordinationError;
use crate::domain::model::{Candle, Timeframe};
use crate::domain::repositories::{CandleRepository, CursorRepository, LeaseRepository};
use crate::infra::repositories::load_universe_from_symbols;
use crate::infra::shard_cache::load_universe_from_file;

#[derive(Debug, Default, serde::Serialize)]
pub struct RunSummary {
    pub status: &'static str,
    pub tickers_processed: usize,
    pub bars_upserted: u64,
    pub frontier_reached: Vec<String>,
    pub errors: Vec<String>,
}

pub struct CandleIngestWorker {
    pub config: CandleIngestConfig,
    pub pool: PgPool,
    pub lease_repo: Arc<dyn LeaseRepository>,
    pub cursor_repo: Arc<dyn CursorRepository>,
    pub candle_repo: Arc<dyn CandleRepository>,
    pub source: Arc<dyn CandleSource>,
}

impl CandleIngestWorker {
    /// Runs one full batch (§4.5 steps 1-7). Never panics on ordinary
    /// source/storage failures; those are folded into `RunSummary.errors`
    /// so the rest of the batch keeps moving (§4.5 "do not block progress
    /// of other tickers").
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let run_timeout = Duration::from_secs(self.config.run_timeout_sec);

        let universe = self.load_universe().await?;
        let universe = shard_router::maybe_include_indices(universe, self.config.include_indices);
        let shard_universe = shard_router::universe_for_shard(
            &universe,
            self.config.shard_count,
            self.config.shard_index,
        );

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
            // §7 "CoordinationUnavailable... Worker exits 0 with a structured
            // skipped: 'lease_error' log; does NOT write data" (§4.5
            // coordinator-down branch). Must not fall through to the
            // generic `?` propagation the caller's exit-1 path uses.
            Err(CoordinationError::Unavailable { reason }) => {
                warn!(
                    job = %self.config.job_name,
                    shard = self.config.shard_index,
                    skipped = "lease_error",
                    reason,
                    "lease coordinator unreachable; skipping run without writes"
                );
                return Ok(RunSummary {
                    status: "skipped",
                    errors: vec![format!("lease_error: {reason}")],
                    ..Default::default()
                });
            }
            Err(e) => return Err(e.into()),
        };

        let lease = match claim {
            ClaimOutcome::Skipped => {
                return Ok(RunSummary {
                    status: "skipped",
                    ..Default::default()
                });
            }
            ClaimOutcome::Claimed(lease) => lease,
        };

        let cursor_file = self.config.cursor_file();
        let batch = shard_router::select_batch(
            &self.cursor_repo,
            &self.config.job_name,
            self.config.shard_index,
            &shard_universe,
            self.config.batch_size,
            &cursor_file,
        )
        .await?;

        let mut summary = RunSummary {
            status: "ok",
            ..Default::default()
        };

        let mut last_completed_index = 0usize;

        for (i, ticker) in batch.tickers.iter().enumerate() {
            if lease.lost_ownership() {
                warn!(job = %self.config.job_name, shard = self.config.shard_index, "lease lost mid-batch; stopping");
                summary.status = "error";
                summary.errors.push("lease ownership lost".to_string());
                break;
            }
            if started.elapsed() >= run_timeout {
                info!(job = %self.config.job_name, "approaching run_timeout_sec; stopping between tickers");
                break;
            }

            match self.process_ticker(ticker, &mut summary).await {
                Ok(()) => {
                    last_completed_index = i + 1;
                }
                Err(e) => {
                    warn!(ticker, error = %e, "ticker processing failed; continuing batch");
                    summary.errors.push(format!("{ticker}: {e}"));
                    last_completed_index = i + 1;
                }
            }

            if let Err(e) = lease.report_progress().await {
                warn!(error = %e, "report_progress failed");
                summary.status = "error";
                break;
            }
        }

        // Advance the cursor to however far we actually got, not the full
        // requested batch, so a timeout/lease-loss never skips work.
        let mut next_cursor = batch.next_cursor;
        if last_completed_index < batch.tickers.len() {
            let processed = &batch.tickers[..last_completed_index];
            next_cursor.last_batch = Some(processed.to_vec());
            if next_cursor.universe_count > 0 {
                let resumed_at = shard_universe
                    .iter()
                    .position(|t| Some(t) == batch.tickers.first())
                    .unwrap_or(0) as i64
                    + last_completed_index as i64;
                next_cursor.next_index = resumed_at.rem_euclid(next_cursor.universe_count);
            }
        }

        shard_router::commit_cursor(&self.cursor_repo, &cursor_file, &next_cursor).await?;
        summary.tickers_processed = last_completed_index;
        Ok(summary)
    }

    /// §4.3 option (a): a JSON universe file, when `UNIVERSE_FILE` is set.
    /// Option (b): a SQL query against the warehouse `symbols` table
    /// otherwise (§4.3, `infra::repositories::load_universe_from_symbols`).
    async fn load_universe(&self) -> Result<Vec<String>> {
        match &self.config.universe_path {
            Some(path) => load_universe_from_file(&PathBuf::from(path)),
            None => load_universe_from_symbols(&self.pool, Some("active = true")).await,
        }
    }

    async fn process_ticker(&self, ticker: &str, summary: &mut RunSummary) -> Result<()> {
        for &tf in &self.config.tfs {
            self.process_ticker_tf(ticker, tf, summary).await?;
        }
        Ok(())
    }

    async fn process_ticker_tf(
        &self,
        ticker: &str,
        tf: Timeframe,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let frontier = self.candle_repo.frontier(ticker, tf).await?;
        let mut from_ms = frontier
            .map(|ts| ts + tf.grid_ms())
            .unwrap_or_else(|| self.config.start_ms_for(tf));

        let mut prior_newest: Option<i64> = None;
        let mut stagnant_pages = 0u32;

        loop {
            let page = self
                .source
                .fetch_page(ticker, tf, from_ms, self.config.chunk)
                .await?;

            if page.is_empty() {
                break;
            }

            let valid: Vec<Candle> = page.into_iter().filter(|c| c.is_valid()).collect();
            let newest_in_page = valid.iter().map(|c| c.ts_ms).max();

            if !valid.is_empty() {
                self.candle_repo.upsert_candles(&valid).await?;
                summary.bars_upserted += valid.len() as u64;
            }

            let got_full_page = valid.len() as i64 >= self.config.chunk;
            match (newest_in_page, prior_newest) {
                (Some(newest), Some(prior)) if newest <= prior => {
                    stagnant_pages += 1;
                }
                _ => stagnant_pages = 0,
            }
            prior_newest = newest_in_page.or(prior_newest);

            if stagnant_pages >= 2 || !got_full_page {
                // §4.5 "frontier reached" policy: stop paging this
                // (ticker,tf) once the newest timestamp stops advancing.
                summary.frontier_reached.push(format!("{ticker}/{}", tf.as_str()));
                break;
            }

            from_ms = newest_in_page.map(|ts| ts + tf.grid_ms()).unwrap_or(from_ms);

            if self.config.sleep_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.sleep_ms)).await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_summary_defaults_to_empty() {
        let s = RunSummary::default();
        assert_eq!(s.tickers_processed, 0);
        assert_eq!(s.bars_upserted, 0);
    }
}
