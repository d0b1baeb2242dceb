// SPDX-License-Identifier: MIT

use super::*;
use crate::digest::Hasher;

fn digest_for(tag: &str) -> Digest {
    let mut h = Hasher::new();
    h.append(tag.as_bytes());
    h.finalize()
}

fn sample_entry(path: &str, tag: &str) -> IncludeEntry {
    IncludeEntry {
        path: path.to_string(),
        digest: digest_for(tag),
        size: 123,
        mtime: 1_700_000_000,
        ctime: 1_700_000_000,
    }
}

#[test]
fn round_trip_preserves_structure() {
    let mut m = Manifest::new();
    let key = digest_for("object-key-1");
    let entries = vec![sample_entry("/usr/include/stdio.h", "a"), sample_entry("foo.h", "b")];
    m.put(key, &entries);

    let bytes = m.to_bytes();
    let parsed = Manifest::from_bytes(&bytes).expect("valid manifest parses");

    assert_eq!(parsed.paths.len(), 2);
    assert_eq!(parsed.file_infos.len(), 2);
    assert_eq!(parsed.results.len(), 1);
    assert_eq!(parsed.results[0].object_key, key);
}

#[test]
fn put_then_get_returns_same_key() {
    let mut m = Manifest::new();
    let key = digest_for("object-key-2");
    let entries = vec![sample_entry("a.h", "x"), sample_entry("b.h", "y")];
    m.put(key, &entries);

    let found = m.get(|entry| entries.iter().any(|e| e == entry));
    assert_eq!(found, Some(key));
}

#[test]
fn get_rejects_when_any_entry_fails_to_match() {
    let mut m = Manifest::new();
    let key = digest_for("object-key-3");
    let entries = vec![sample_entry("a.h", "x"), sample_entry("b.h", "y")];
    m.put(key, &entries);

    // Only confirm the first entry; the second is implicitly "changed".
    let found = m.get(|entry| entry.path == "a.h");
    assert_eq!(found, None);
}

#[test]
fn no_duplicate_include_entries_within_one_manifest() {
    let mut m = Manifest::new();
    let shared = sample_entry("common.h", "shared");
    m.put(digest_for("k1"), &[shared.clone(), sample_entry("only1.h", "o1")]);
    m.put(digest_for("k2"), &[shared.clone(), sample_entry("only2.h", "o2")]);

    let dup_count = m
        .file_infos
        .iter()
        .filter(|fi| {
            fi.path == shared.path
                && fi.digest == shared.digest
                && fi.size == shared.size
                && fi.mtime == shared.mtime
                && fi.ctime == shared.ctime
        })
        .count();
    assert_eq!(dup_count, 1, "shared include entry must not be duplicated");
    assert_eq!(m.results.len(), 2);
}

#[test]
fn unknown_magic_is_treated_as_absent() {
    let mut m = Manifest::new();
    m.put(digest_for("k"), &[sample_entry("a.h", "a")]);
    let mut bytes = m.to_bytes();
    bytes[0] ^= 0xFF; // corrupt the magic
    assert!(Manifest::from_bytes(&bytes).is_none());
}

#[test]
fn unknown_version_is_treated_as_absent() {
    let mut m = Manifest::new();
    m.put(digest_for("k"), &[sample_entry("a.h", "a")]);
    let mut bytes = m.to_bytes();
    bytes[4] = 0xFF; // version byte
    assert!(Manifest::from_bytes(&bytes).is_none());
}

#[test]
fn truncated_data_is_treated_as_absent() {
    let mut m = Manifest::new();
    m.put(digest_for("k"), &[sample_entry("a.h", "a")]);
    let bytes = m.to_bytes();
    assert!(Manifest::from_bytes(&bytes[..bytes.len() - 3]).is_none());
}

#[test]
fn out_of_range_file_info_index_is_rejected() {
    let mut m = Manifest::new();
    m.put(digest_for("k"), &[sample_entry("a.h", "a")]);
    let mut bytes = m.to_bytes();
    // Last 4 bytes before the digest in the single result record is the
    // sole file_info_indexes[0] entry; corrupt it to an out-of-range value.
    let digest_start = bytes.len() - DIGEST_SIZE;
    let idx_start = digest_start - 4;
    bytes[idx_start..digest_start].copy_from_slice(&999u32.to_be_bytes());
    assert!(Manifest::from_bytes(&bytes).is_none());
}

#[test]
fn store_then_load_round_trips_through_compression() {
    let mut m = Manifest::new();
    m.put(digest_for("k"), &[sample_entry("a.h", "a"), sample_entry("b.h", "b")]);

    let dir = std::env::temp_dir().join(format!(
        "ccwrap-manifest-test-{}-{}",
        std::process::id(),
        now_seconds()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("x.manifest");

    store(&path, &m).unwrap();
    let raw = std::fs::read(&path).unwrap();
    assert_eq!(raw[0], 0x78, "stored manifest should be zlib-compressed");

    let loaded = load(&path).expect("stored manifest loads back");
    assert_eq!(loaded.results.len(), 1);
    assert_eq!(loaded.file_infos.len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn load_missing_file_returns_none() {
    let path = std::env::temp_dir().join("ccwrap-manifest-does-not-exist.manifest");
    assert!(load(&path).is_none());
}

#[test]
fn exceeding_result_bound_discards_and_rebuilds() {
    let mut m = Manifest::new();
    for i in 0..MAX_RESULTS {
        m.put(digest_for(&format!("k{i}")), &[sample_entry("shared.h", "s")]);
    }
    assert_eq!(m.results.len(), MAX_RESULTS);

    // One more put should discard the accumulated history rather than grow
    // past the bound.
    m.put(digest_for("overflow"), &[sample_entry("shared.h", "s")]);
    assert_eq!(m.results.len(), 1);
}
