// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn hex_round_trip() {
    let mut h = Hasher::new();
    h.append(b"hello world");
    let digest = h.finalize();
    let hex = digest.to_hex();
    assert_eq!(hex.len(), DIGEST_SIZE * 2);
    assert_eq!(Digest::from_hex(&hex), Some(digest));
}

#[test]
fn deterministic() {
    let mut a = Hasher::new();
    a.append(b"abc").delimiter("arg").append(b"def");
    let mut b = Hasher::new();
    b.append(b"abc").delimiter("arg").append(b"def");
    assert_eq!(a.finalize(), b.finalize());
}

#[test]
fn delimiter_prevents_region_collision() {
    // "-I" + "-O2" vs "-I-O2" must hash differently because of the delimiter
    // between arguments.
    let mut a = Hasher::new();
    a.delimiter("arg").append(b"-I").delimiter("arg").append(b"-O2");

    let mut b = Hasher::new();
    b.delimiter("arg").append(b"-I-O2");

    assert_ne!(a.finalize(), b.finalize());
}

#[test]
fn delimiter_tag_matters() {
    let mut a = Hasher::new();
    a.delimiter("cpp").append(b"data");

    let mut b = Hasher::new();
    b.delimiter("cppstderr").append(b"data");

    assert_ne!(a.finalize(), b.finalize());
}

#[test]
fn append_int_distinguishes_boundaries() {
    let mut a = Hasher::new();
    a.append_int(12).append_int(3);

    let mut b = Hasher::new();
    b.append_int(1).append_int(23);

    assert_ne!(a.finalize(), b.finalize());
}

#[test]
fn append_file_matches_in_memory_bytes() {
    let dir = std::env::temp_dir().join(format!("ccwrap-digest-test-{:?}", std::thread::current().id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sample.txt");
    std::fs::write(&path, b"the quick brown fox").unwrap();

    let mut from_file = Hasher::new();
    from_file.append_file(&path).unwrap();

    let mut from_memory = Hasher::new();
    from_memory.append(b"the quick brown fox");

    assert_eq!(from_file.finalize(), from_memory.finalize());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn from_hex_rejects_wrong_length() {
    assert_eq!(Digest::from_hex("abcd"), None);
}
