//! File-backed cursor cache and JSON universe loader (C3, §4.3 / §6
//! "Persisted state on the ingest node"). The warehouse `shard_cursors`
//! table (`infra::repositories::PgCursorRepository`) is authoritative;
//! this file form is an advisory per-node cache that lets a worker resume
//! quickly without a round-trip when the warehouse agrees, and is written
//! with write-temp + atomic rename so a crash mid-write never leaves a
//! torn cursor file (§5, §9 Design Notes "File + warehouse dual storage").

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::model::ShardCursor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorFile {
    pub next_index: i64,
    pub last_batch: Option<Vec<String>>,
    pub batch_size: i64,
    pub universe_count: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&ShardCursor> for CursorFile {
    fn from(c: &ShardCursor) -> Self {
        Self {
            next_index: c.next_index,
            last_batch: c.last_batch.clone(),
            batch_size: c.batch_size,
            universe_count: c.universe_count,
            updated_at: c.updated_at,
        }
    }
}

/// Reads `path` if present; a missing or unparsable file is not an error -
/// the caller falls back to the warehouse-backed cursor (or index 0).
pub fn read_cursor_file(path: &Path) -> Option<CursorFile> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Write-temp + atomic rename into `path`, creating parent directories as
/// needed. `cursors/{job_name}_{shard_index}.json` per §6.
pub fn write_cursor_file(path: &Path, cursor: &CursorFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = tmp_path_for(path);
    let body = serde_json::to_vec_pretty(cursor).context("serializing cursor file")?;

    let mut f = fs::File::create(&tmp_path)
        .with_context(|| format!("creating temp file {}", tmp_path.display()))?;
    f.write_all(&body)
        .with_context(|| format!("writing temp file {}", tmp_path.display()))?;
    f.sync_all().ok();
    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Universe file shape: `{"tickers": [...]}` (§4.3).
#[derive(Debug, Deserialize)]
struct UniverseFile {
    tickers: Vec<String>,
}

/// Loads, normalizes (uppercase + trim), drops tickers failing the
/// universe regex, deduplicates, and sorts - so successive runs visit the
/// same stable ordering absent a configuration change (§4.3 invariant).
pub fn load_universe_from_file(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).with_context(|| format!("reading universe file {}", path.display()))?;
    let parsed: UniverseFile =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing universe file {}", path.display()))?;
    Ok(normalize_universe(parsed.tickers))
}

pub fn normalize_universe(raw: Vec<String>) -> Vec<String> {
    use crate::domain::ticker::{is_valid_universe_ticker, normalize_ticker};
    use std::collections::BTreeSet;

    let mut set: BTreeSet<String> = BTreeSet::new();
    for t in raw {
        let norm = normalize_ticker(&t);
        if is_valid_universe_ticker(&norm) {
            set.insert(norm);
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn normalize_universe_dedupes_and_sorts() {
        let raw = vec!["fpt".into(), "HPG".into(), " fpt ".into(), "A".into(), "vnm".into()];
        // "A" fails the 2-char universe filter and is dropped.
        let out = normalize_universe(raw);
        assert_eq!(out, vec!["FPT".to_string(), "HPG".to_string(), "VNM".to_string()]);
    }

    #[test]
    fn cursor_file_round_trips_through_write_temp_rename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("candle-ingest_0.json");
        let cursor = CursorFile {
            next_index: 42,
            last_batch: Some(vec!["FPT".into(), "HPG".into()]),
            batch_size: 25,
            universe_count: 500,
            updated_at: chrono::Utc::now(),
        };
        write_cursor_file(&path, &cursor).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let read_back = read_cursor_file(&path).unwrap();
        assert_eq!(read_back.next_index, 42);
        assert_eq!(read_back.last_batch, Some(vec!["FPT".to_string(), "HPG".to_string()]));
    }

    #[test]
    fn missing_cursor_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_cursor_file(&path).is_none());
    }
}
