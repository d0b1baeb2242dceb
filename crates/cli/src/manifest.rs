// SPDX-License-Identifier: MIT

//! Persistent (include-file-state -> ObjectKey) index used by direct mode.
//!
//! Grounded in `manifest.c`'s binary layout. Big-endian integers throughout;
//! the file may optionally be zlib-compressed, transparently on both read
//! and write.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use flate2::Compression as ZCompression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::digest::{DIGEST_SIZE, Digest};

/// Historical and current magic constants. A manifest bearing any other
/// magic is treated as absent, never as an error.
const MAGIC_CURRENT: u32 = 0x63436d46; // "cCmF"
const KNOWN_MAGICS: &[u32] = &[MAGIC_CURRENT];

const VERSION: u8 = 1;

/// Bound on the number of Result records before a manifest is discarded and
/// rebuilt from scratch rather than grown further.
pub const MAX_RESULTS: usize = 100;
/// Bound on the number of distinct IncludeEntry records.
pub const MAX_FILE_INFOS: usize = 10_000;

/// One header file's recorded state at hash time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludeEntry {
    pub path: String,
    pub digest: Digest,
    pub size: u64,
    /// `-1` means "too new to cache stat-based match".
    pub mtime: i64,
    pub ctime: i64,
}

/// One cached compilation result: the set of include files (by index into
/// the manifest's dedup table) whose state produced `object_key`.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub file_info_indexes: Vec<u32>,
    pub object_key: Digest,
}

/// The full persistent manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub paths: Vec<String>,
    pub file_infos: Vec<IncludeEntry>,
    pub results: Vec<ResultRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_index(&mut self, path: &str) -> u32 {
        if let Some(i) = self.paths.iter().position(|p| p == path) {
            return i as u32;
        }
        self.paths.push(path.to_string());
        (self.paths.len() - 1) as u32
    }

    /// Insert (deduplicating) the include entries for one result, returning
    /// their indexes into `file_infos` in the same order as `entries`.
    fn intern_entries(&mut self, entries: &[IncludeEntry]) -> Vec<u32> {
        let mut indexes = Vec::with_capacity(entries.len());
        for entry in entries {
            let path_index = self.path_index(&entry.path);
            let existing = self.file_infos.iter().position(|fi| {
                fi.path == entry.path
                    && fi.digest == entry.digest
                    && fi.size == entry.size
                    && fi.mtime == entry.mtime
                    && fi.ctime == entry.ctime
            });
            let idx = match existing {
                Some(i) => i as u32,
                None => {
                    let mut stored = entry.clone();
                    // Store the path index implicitly via `self.paths`
                    // ordering already captured above; keep the entry's own
                    // path string too so lookups don't need to re-resolve.
                    stored.path = self.paths[path_index as usize].clone();
                    self.file_infos.push(stored);
                    (self.file_infos.len() - 1) as u32
                }
            };
            indexes.push(idx);
        }
        indexes
    }

    /// Add a new Result to the end of the list, deduplicating include
    /// entries against the existing table. If adding would exceed
    /// [`MAX_RESULTS`] or [`MAX_FILE_INFOS`], the manifest is discarded and
    /// rebuilt starting from just this one result.
    pub fn put(&mut self, object_key: Digest, entries: &[IncludeEntry]) {
        if self.results.len() >= MAX_RESULTS || self.file_infos.len() + entries.len() > MAX_FILE_INFOS
        {
            *self = Manifest::new();
        }
        let indexes = self.intern_entries(entries);
        self.results.push(ResultRecord { file_info_indexes: indexes, object_key });
    }

    /// Look up a matching result using `matcher` to decide whether a given
    /// `IncludeEntry` still matches the live filesystem. Iterates results
    /// newest-first so the most recently added (most likely to still be
    /// accurate) match wins.
    pub fn get(&self, mut matches: impl FnMut(&IncludeEntry) -> bool) -> Option<Digest> {
        for result in self.results.iter().rev() {
            let all_match = result
                .file_info_indexes
                .iter()
                .all(|&idx| self.file_infos.get(idx as usize).is_some_and(&mut matches));
            if all_match {
                return Some(result.object_key);
            }
        }
        None
    }

    /// Serialize to the binary format described in SPEC_FULL.md §6.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC_CURRENT.to_be_bytes());
        out.push(VERSION);
        out.extend_from_slice(&[16, 0, 0]); // legacy "hash size" + reserved

        out.extend_from_slice(&(self.paths.len() as u32).to_be_bytes());
        for path in &self.paths {
            out.extend_from_slice(path.as_bytes());
            out.push(0);
        }

        out.extend_from_slice(&(self.file_infos.len() as u32).to_be_bytes());
        for entry in &self.file_infos {
            let path_index = self.paths.iter().position(|p| *p == entry.path).unwrap_or(0) as u32;
            out.extend_from_slice(&path_index.to_be_bytes());
            out.extend_from_slice(entry.digest.as_bytes());
            out.extend_from_slice(&entry.size.to_be_bytes());
            out.extend_from_slice(&entry.mtime.to_be_bytes());
            out.extend_from_slice(&entry.ctime.to_be_bytes());
        }

        out.extend_from_slice(&(self.results.len() as u32).to_be_bytes());
        for result in &self.results {
            out.extend_from_slice(&(result.file_info_indexes.len() as u32).to_be_bytes());
            for idx in &result.file_info_indexes {
                out.extend_from_slice(&idx.to_be_bytes());
            }
            out.extend_from_slice(result.object_key.as_bytes());
        }

        out
    }

    /// Parse the binary format. Any structural inconsistency — unknown
    /// magic, unknown version, truncated records, an index out of range —
    /// is treated as "manifest absent" (`Ok(None)`), never as a hard error;
    /// a corrupt manifest should degrade to a cache miss, not crash the
    /// invocation.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let mut r = Reader { data, pos: 0 };
        let magic = r.read_u32()?;
        if !KNOWN_MAGICS.contains(&magic) {
            return None;
        }
        let version = r.read_u8()?;
        if version != VERSION {
            return None;
        }
        r.skip(3)?; // legacy hash-size + reserved bytes

        let n_paths = r.read_u32()? as usize;
        let mut paths = Vec::with_capacity(n_paths.min(1 << 16));
        for _ in 0..n_paths {
            paths.push(r.read_cstring()?);
        }

        let n_entries = r.read_u32()? as usize;
        let mut file_infos = Vec::with_capacity(n_entries.min(1 << 16));
        for _ in 0..n_entries {
            let path_index = r.read_u32()? as usize;
            let digest = r.read_digest()?;
            let size = r.read_u64()?;
            let mtime = r.read_i64()?;
            let ctime = r.read_i64()?;
            let path = paths.get(path_index)?.clone();
            file_infos.push(IncludeEntry { path, digest, size, mtime, ctime });
        }

        let n_results = r.read_u32()? as usize;
        let mut results = Vec::with_capacity(n_results.min(1 << 16));
        for _ in 0..n_results {
            let m = r.read_u32()? as usize;
            let mut file_info_indexes = Vec::with_capacity(m.min(1 << 16));
            for _ in 0..m {
                let idx = r.read_u32()?;
                if idx as usize >= file_infos.len() {
                    return None;
                }
                file_info_indexes.push(idx);
            }
            let object_key = r.read_digest()?;
            results.push(ResultRecord { file_info_indexes, object_key });
        }

        Some(Manifest { paths, file_infos, results })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Option<i64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    fn read_digest(&mut self) -> Option<Digest> {
        let bytes: [u8; DIGEST_SIZE] = self.take(DIGEST_SIZE)?.try_into().ok()?;
        Some(Digest::from_bytes(bytes))
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    fn read_cstring(&mut self) -> Option<String> {
        let rest = self.data.get(self.pos..)?;
        let nul = rest.iter().position(|&b| b == 0)?;
        if nul > 1024 {
            return None;
        }
        let bytes = self.take(nul)?;
        self.pos += 1; // consume the NUL
        String::from_utf8(bytes.to_vec()).ok()
    }
}

/// Transparently decompress a manifest file's raw bytes if they carry a
/// zlib header; otherwise return them unchanged.
fn maybe_decompress(raw: &[u8]) -> Vec<u8> {
    if raw.len() >= 2 && raw[0] == 0x78 {
        let mut decoder = ZlibDecoder::new(raw);
        let mut out = Vec::new();
        if decoder.read_to_end(&mut out).is_ok() {
            return out;
        }
    }
    raw.to_vec()
}

/// Load a manifest from disk. A missing, unreadable, or unparsable file is
/// treated the same way: "no manifest here yet".
pub fn load(path: &Path) -> Option<Manifest> {
    let raw = fs::read(path).ok()?;
    let bytes = maybe_decompress(&raw);
    Manifest::from_bytes(&bytes)
}

/// Write a manifest to disk, compressed, via temp-file-then-rename.
/// Manifests are treated as immutable once written: a racing writer may
/// cause one of the two writes to "win" and the other's single new Result
/// to be lost, which is an accepted trade-off (see SPEC_FULL.md §5).
pub fn store(path: &Path, manifest: &Manifest) -> io::Result<()> {
    let raw = manifest.to_bytes();
    let mut encoder = ZlibEncoder::new(Vec::new(), ZCompression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("manifest.tmp");
    fs::write(&tmp, &compressed)?;
    fs::rename(&tmp, path)
}

/// Touch a manifest's mtime to mark it recently used, mirroring the
/// analogous step for object-key results.
pub fn touch(path: &Path) -> io::Result<()> {
    crate::shard::touch(path)
}

pub fn now_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
