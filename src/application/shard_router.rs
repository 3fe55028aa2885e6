//! Shard router + cursor store (C3, §4.3): resolves this run's slice of
//! the ticker universe and the batch of tickers to process this run,
//! reconciling the warehouse-authoritative cursor with the advisory
//! file-backed cache (§9 Design Notes: "on conflict, re-read from the
//! warehouse").

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::domain::model::ShardCursor;
use crate::domain::repositories::CursorRepository;
use crate::domain::shard::shard_of;
use crate::infra::shard_cache::{self, CursorFile};

/// Loads the universe from a JSON file and restricts it to the tickers
/// owned by `shard_index` out of `shard_count` (§4.3 `shard_of`).
pub fn universe_for_shard(
    universe: &[String],
    shard_count: i32,
    shard_index: i32,
) -> Vec<String> {
    universe
        .iter()
        .filter(|t| shard_of(t, shard_count) == shard_index)
        .cloned()
        .collect()
}

/// Appends broad market indices to the loaded universe when
/// `include_indices` is set (§4.5 candle-ingest-config option).
pub const MARKET_INDICES: &[&str] = &["VNINDEX", "HNXINDEX", "UPCOMINDEX"];

pub fn maybe_include_indices(mut universe: Vec<String>, include_indices: bool) -> Vec<String> {
    if include_indices {
        for idx in MARKET_INDICES {
            if !universe.iter().any(|t| t == idx) {
                universe.push((*idx).to_string());
            }
        }
        universe.sort();
    }
    universe
}

/// One resolved batch: the tickers to process this run and the cursor
/// state to persist once the batch commits.
pub struct ResolvedBatch {
    pub tickers: Vec<String>,
    pub next_cursor: ShardCursor,
}

/// Loads the cursor (warehouse first, file cache only when the warehouse
/// has none, matching §9's "warehouse is authoritative" rule), then
/// selects up to `batch_size` tickers starting at `next_index`, wrapping
/// around the shard's ticker list (§4.3 `select_batch`).
pub async fn select_batch(
    cursor_repo: &Arc<dyn CursorRepository>,
    job: &str,
    shard: i32,
    shard_universe: &[String],
    batch_size: i64,
    cursor_file_path: &Path,
) -> Result<ResolvedBatch> {
    let universe_count = shard_universe.len() as i64;

    let warehouse_cursor = cursor_repo.load(job, shard).await?;
    let next_index = match warehouse_cursor {
        Some(c) => c.next_index,
        None => {
            if let Some(cached) = shard_cache::read_cursor_file(cursor_file_path) {
                warn!(job, shard, "no warehouse cursor; seeding from file cache");
                cached.next_index
            } else {
                0
            }
        }
    };

    let next_index = if universe_count > 0 {
        next_index.rem_euclid(universe_count)
    } else {
        0
    };

    let tickers = select_wrapping(shard_universe, next_index, batch_size);

    let advanced = if universe_count > 0 {
        (next_index + tickers.len() as i64).rem_euclid(universe_count)
    } else {
        0
    };

    let next_cursor = ShardCursor {
        job: job.to_string(),
        shard,
        next_index: advanced,
        last_batch: Some(tickers.clone()),
        batch_size,
        universe_count,
        updated_at: Utc::now(),
    };

    Ok(ResolvedBatch {
        tickers,
        next_cursor,
    })
}

/// Returns up to `batch_size` items from `universe` starting at `start`,
/// wrapping around the end of the list exactly once.
fn select_wrapping(universe: &[String], start: i64, batch_size: i64) -> Vec<String> {
    if universe.is_empty() || batch_size <= 0 {
        return vec![];
    }
    let n = universe.len();
    let take = (batch_size as usize).min(n);
    let start = start as usize % n;
    (0..take).map(|i| universe[(start + i) % n].clone()).collect()
}

/// Persists the advanced cursor to both the warehouse (authoritative) and
/// the file cache (advisory), only after the caller's batch has committed
/// (§4.5 step 6: "Cursor is written ONLY after the batch commits").
pub async fn commit_cursor(
    cursor_repo: &Arc<dyn CursorRepository>,
    cursor_file_path: &Path,
    cursor: &ShardCursor,
) -> Result<()> {
    cursor_repo.save(cursor).await?;
    let file_form = CursorFile::from(cursor);
    if let Err(e) = shard_cache::write_cursor_file(cursor_file_path, &file_form) {
        warn!(error = %e, "failed to write advisory cursor-file cache");
    }
    info!(
        job = %cursor.job,
        shard = cursor.shard,
        next_index = cursor.next_index,
        "cursor advanced"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_wrapping_stays_within_bounds_and_wraps() {
        let universe: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let batch = select_wrapping(&universe, 3, 4);
        assert_eq!(batch, vec!["D", "E", "A", "B"]);
    }

    #[test]
    fn select_wrapping_handles_batch_larger_than_universe() {
        let universe: Vec<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let batch = select_wrapping(&universe, 0, 10);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn universe_for_shard_partitions_deterministically() {
        let universe: Vec<String> = ["FPT", "HPG", "VNM", "VIC", "MSN", "MWG"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut seen = std::collections::HashSet::new();
        for shard in 0..4 {
            for t in universe_for_shard(&universe, 4, shard) {
                assert!(seen.insert(t), "ticker assigned to more than one shard");
            }
        }
        assert_eq!(seen.len(), universe.len());
    }

    #[test]
    fn maybe_include_indices_appends_only_when_enabled() {
        let universe = vec!["FPT".to_string()];
        let without = maybe_include_indices(universe.clone(), false);
        assert_eq!(without, universe);
        let with = maybe_include_indices(universe, true);
        assert!(with.contains(&"VNINDEX".to_string()));
    }
}
