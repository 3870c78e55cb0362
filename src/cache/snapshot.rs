//! Best-effort on-disk cache snapshots for warm restarts.
//!
//! A snapshot is JSON written to a temporary sibling file and renamed into
//! place, so a crash mid-write leaves the previous snapshot intact. Loading
//! never fails startup: a missing, unreadable or corrupt file yields an
//! empty cache.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::entry::{current_timestamp_ms, CacheEntry};
use crate::cache::ResponseCache;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at_ms: u64,
    /// Kept as raw values so one bad entry does not discard the rest.
    entries: Vec<Value>,
}

/// Write all live entries to `path`. Returns the number written.
pub fn save(cache: &ResponseCache, path: &Path) -> io::Result<usize> {
    let entries: Vec<Value> = cache
        .export()
        .into_iter()
        .filter_map(|e| serde_json::to_value(e).ok())
        .collect();
    let count = entries.len();

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        saved_at_ms: current_timestamp_ms(),
        entries,
    };
    let bytes = serde_json::to_vec(&snapshot).map_err(io::Error::other)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;

    tracing::info!(path = %path.display(), entries = count, "Cache snapshot saved");
    Ok(count)
}

/// Load a snapshot into `cache`. Returns the number of entries restored.
pub fn load(cache: &ResponseCache, path: &Path) -> usize {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No cache snapshot found");
            return 0;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read cache snapshot, starting empty");
            return 0;
        }
    };

    let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt cache snapshot, starting empty");
            return 0;
        }
    };
    if snapshot.version != SNAPSHOT_VERSION {
        tracing::warn!(version = snapshot.version, "Unsupported cache snapshot version, starting empty");
        return 0;
    }

    let total = snapshot.entries.len();
    let entries: Vec<CacheEntry> = snapshot
        .entries
        .into_iter()
        .filter_map(|v| serde_json::from_value::<CacheEntry>(v).ok())
        .filter(|e| e.value.decode(&e.key).is_ok())
        .collect();
    let skipped_corrupt = total - entries.len();

    let loaded = cache.import(entries);
    tracing::info!(
        path = %path.display(),
        loaded,
        skipped_corrupt,
        "Cache snapshot loaded"
    );
    loaded
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cache-snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}
