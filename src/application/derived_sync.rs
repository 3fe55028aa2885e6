//! Derived surfaces sync (C11, §4.11): periodically rebuilds summary
//! tables from raw ingest output. Every rebuild is a full
//! delete-then-insert per group, run inside one transaction in the
//! repository layer, so a partial failure never leaves a half-updated
//! table.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::config::DerivedSyncConfig;
use crate::domain::repositories::{DerivedRepository, MarketStatsSummary};

pub struct DerivedSyncWorker {
    pub config: DerivedSyncConfig,
    pub repo: Arc<dyn DerivedRepository>,
}

#[derive(Debug)]
pub struct SyncResult {
    pub context_rows: i64,
    pub market_stats: MarketStatsSummary,
}

impl DerivedSyncWorker {
    pub fn new(config: DerivedSyncConfig, repo: Arc<dyn DerivedRepository>) -> Self {
        Self { config, repo }
    }

    /// Runs one rebuild pass: `symbol_context_latest` then `market_stats`.
    pub async fn run_once(&self) -> Result<SyncResult> {
        let now = Utc::now();
        let context_rows = self.repo.rebuild_context_latest(now).await?;
        let market_stats = self.repo.rebuild_market_stats(now).await?;
        info!(
            context_rows,
            coverage_pct = market_stats.candles_coverage_pct,
            "derived surfaces rebuilt"
        );
        Ok(SyncResult { context_rows, market_stats })
    }

    /// Runs `run_once` on a fixed interval until cancelled, logging but
    /// not aborting on a single pass's failure (§4.11: periodic, best-effort
    /// per tick).
    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_sec));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "derived sync pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("derived sync worker shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{StorageResult, TfCoverage};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeDerivedRepo {
        calls: AtomicI64,
    }

    #[async_trait]
    impl DerivedRepository for FakeDerivedRepo {
        async fn rebuild_context_latest(&self, _now: DateTime<Utc>) -> StorageResult<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }

        async fn rebuild_market_stats(&self, _now: DateTime<Utc>) -> StorageResult<MarketStatsSummary> {
            Ok(MarketStatsSummary {
                candles_eligible_total: 100,
                candles_with_candles: 90,
                candles_missing: 10,
                candles_coverage_pct: 90.0,
                per_tf_rows: vec![TfCoverage {
                    tf: crate::domain::model::Timeframe::D1,
                    rows: 90,
                    tickers: 9,
                }],
                frontier_lag_ms: Some(1000),
            })
        }

        async fn get_market_stats(&self) -> StorageResult<Option<MarketStatsSummary>> {
            Ok(None)
        }

        async fn get_context(&self, _ticker: &str) -> StorageResult<Option<crate::domain::model::SymbolContext>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn run_once_rebuilds_both_groups() {
        let repo = Arc::new(FakeDerivedRepo { calls: AtomicI64::new(0) });
        let worker = DerivedSyncWorker::new(
            DerivedSyncConfig { interval_sec: 300, run_timeout_sec: 600 },
            repo.clone(),
        );
        let result = worker.run_once().await.unwrap();
        assert_eq!(result.context_rows, 42);
        assert_eq!(result.market_stats.candles_coverage_pct, 90.0);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 1);
    }
}
