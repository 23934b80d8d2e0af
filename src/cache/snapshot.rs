//! Cache persistence across restarts.
//!
//! The snapshot is JSON. Records keep their absolute creation timestamps, so
//! whatever expired while the process was down is pruned on load.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{Cache, CacheMap, RecordsContainer, now_millis};
use crate::error::ProxyError;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    version: u32,
    /// Unix seconds.
    saved_at: u64,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    name: String,
    container: RecordsContainer,
}

/// Write the cache to `path`. Returns the number of names saved.
///
/// Writes to a sibling temporary file first, then renames over `path`.
pub async fn save(cache: &Cache, path: &Path) -> Result<usize, ProxyError> {
    let snapshot = {
        let map = cache.lock();
        CacheSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: now_millis() / 1000,
            entries: map
                .entries()
                .filter(|(_, container)| !container.is_empty())
                .map(|(name, container)| SnapshotEntry {
                    name: name.clone(),
                    container: container.clone(),
                })
                .collect(),
        }
    };

    let bytes = serde_json::to_vec(&snapshot)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, &bytes).await?;
    fs::rename(&temp_path, path).await?;

    debug!(
        entries = snapshot.entries.len(),
        bytes = bytes.len(),
        path = %path.display(),
        "Saved cache snapshot"
    );

    Ok(snapshot.entries.len())
}

/// Read a cache from `path`.
///
/// A missing file yields an empty cache; anything unreadable is an error
/// for the caller to report.
pub async fn load(path: &Path) -> Result<Cache, ProxyError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache snapshot, starting empty");
            return Ok(Cache::new());
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot: CacheSnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(ProxyError::SnapshotVersion(snapshot.version));
    }

    let now = now_millis();
    let total = snapshot.entries.len();
    let mut map = CacheMap::default();

    for SnapshotEntry {
        name,
        mut container,
    } in snapshot.entries
    {
        container.prune_expired_at(now);
        if !container.is_empty() {
            map.insert(&name, container);
        }
    }

    debug!(
        saved_at = snapshot.saved_at,
        entries = total,
        restored = map.len(),
        path = %path.display(),
        "Loaded cache snapshot"
    );

    Ok(Cache::from_map(map))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
