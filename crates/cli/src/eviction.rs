// SPDX-License-Identifier: MIT

//! Per-shard LRU eviction, grounded in `cleanup.cpp`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::shard::{RESULT_EXTENSIONS, ShardStore, rounded_file_size};
use crate::stats::{self, Counters, Field};

/// Scale-down applied to configured size/file-count limits so that a
/// cleanup pass creates headroom instead of immediately re-triggering.
pub const DEFAULT_LIMIT_MULTIPLE: f64 = 0.8;

/// One discovered entry in a shard, enough to sort and delete by.
struct Entry {
    path: PathBuf,
    mtime: SystemTime,
}

/// Basename substring used by temp files across this crate (`shard.rs`'s
/// `TempInstall` and friends); leftover temp files older than an hour are
/// swept without contributing to the size/file accounting.
const TEMP_MARKER: &str = ".tmp";
const ORPHAN_TEMP_AGE: std::time::Duration = std::time::Duration::from_secs(3600);

/// Result of one shard's cleanup pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupResult {
    pub files_before: u64,
    pub bytes_before: u64,
    pub files_after: u64,
    pub bytes_after: u64,
    pub files_removed: u64,
}

/// Run eviction on a single shard (by id) until both thresholds are
/// satisfied or there's nothing left to delete. `max_files`/`max_size` are
/// the *whole-cache* limits; this function divides by shard count itself.
pub fn evict_shard(
    store: &ShardStore,
    shard_id: &str,
    max_files: u64,
    max_size: u64,
    limit_multiple: f64,
) -> std::io::Result<CleanupResult> {
    let dir = store.shard_dir_for_id(shard_id);
    if !dir.exists() {
        return Ok(CleanupResult::default());
    }

    let shard_count = store.shard_count() as u64;
    let file_limit = ((max_files as f64 / shard_count as f64) * limit_multiple) as u64;
    let size_limit = ((max_size as f64 / shard_count as f64) * limit_multiple) as u64;

    let mut entries = Vec::new();
    let mut files_before = 0u64;
    let mut bytes_before = 0u64;

    for entry in fs::read_dir(&dir)?.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "stats" || name == "CACHEDIR.TAG" {
            continue;
        }

        let mtime = meta.modified().unwrap_or(UNIX_EPOCH);

        if name.contains(TEMP_MARKER) {
            let age = SystemTime::now().duration_since(mtime).unwrap_or_default();
            if age >= ORPHAN_TEMP_AGE {
                let _ = fs::remove_file(&path);
                continue;
            }
        }

        files_before += 1;
        bytes_before += rounded_file_size(meta.len());
        entries.push(Entry { path, mtime });
    }

    entries.sort_by(|a, b| a.mtime.cmp(&b.mtime).then_with(|| a.path.cmp(&b.path)));

    let mut files_now = files_before;
    let mut bytes_now = bytes_before;
    let mut removed_keys: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
    let mut files_removed = 0u64;

    for entry in &entries {
        if files_now <= file_limit && bytes_now <= size_limit {
            break;
        }
        if removed_keys.contains(&entry.path) {
            continue;
        }

        if let Some((key_base, _ext)) = result_family_base(&entry.path) {
            // Delete every sibling of this key, non-stderr first, stderr
            // last, so a crash mid-delete can never leave an orphaned
            // stderr pointing at a missing object.
            for suffix in RESULT_EXTENSIONS {
                let sibling = key_base.with_file_name(format!(
                    "{}{suffix}",
                    key_base.file_name().and_then(|n| n.to_str()).unwrap_or("")
                ));
                if removed_keys.contains(&sibling) {
                    continue;
                }
                if let Ok(meta) = fs::metadata(&sibling) {
                    if fs::remove_file(&sibling).is_ok() {
                        files_now = files_now.saturating_sub(1);
                        bytes_now = bytes_now.saturating_sub(rounded_file_size(meta.len()));
                        files_removed += 1;
                    }
                }
                removed_keys.insert(sibling);
            }
            let manifest = key_base.with_file_name(format!(
                "{}.manifest",
                key_base.file_name().and_then(|n| n.to_str()).unwrap_or("")
            ));
            let _ = fs::remove_file(manifest);
        } else {
            if let Ok(meta) = fs::metadata(&entry.path) {
                if fs::remove_file(&entry.path).is_ok() {
                    files_now = files_now.saturating_sub(1);
                    bytes_now = bytes_now.saturating_sub(rounded_file_size(meta.len()));
                    files_removed += 1;
                }
            }
            removed_keys.insert(entry.path.clone());
        }
    }

    let stats_path = store.stats_path_for_id(shard_id);
    let mut delta = Counters::new();
    delta.set_mut(Field::FilesInCache, files_now);
    delta.set_mut(Field::CacheSizeKib, bytes_now / 1024);
    delta.increment(Field::CleanupsRun, 1);
    stats::flush(&stats_path, &delta);

    Ok(CleanupResult {
        files_before,
        bytes_before,
        files_after: files_now,
        bytes_after: bytes_now,
        files_removed,
    })
}

/// Given a path with one of the result extensions, return the "key base"
/// path (the path with that extension stripped) that all siblings share.
fn result_family_base(path: &Path) -> Option<(PathBuf, &'static str)> {
    let name = path.file_name()?.to_str()?;
    for ext in RESULT_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(ext) {
            return Some((path.with_file_name(stripped), ext));
        }
    }
    None
}

/// Run eviction across every shard in the store.
pub fn evict_all(
    store: &ShardStore,
    max_files: u64,
    max_size: u64,
    limit_multiple: f64,
) -> Vec<(String, std::io::Result<CleanupResult>)> {
    use rayon::prelude::*;
    store
        .all_shard_ids()
        .into_par_iter()
        .map(|id| {
            let result = evict_shard(store, &id, max_files, max_size, limit_multiple);
            (id, result)
        })
        .collect()
}

#[cfg(test)]
#[path = "eviction_tests.rs"]
mod tests;
