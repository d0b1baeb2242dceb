// SPDX-License-Identifier: MIT

use super::*;
use crate::digest::Hasher;

fn temp_root() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ccwrap-shard-test-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn sample_key() -> Digest {
    let mut h = Hasher::new();
    h.append(b"sample object key");
    h.finalize()
}

#[test]
fn path_for_uses_two_level_sharding() {
    let root = temp_root();
    let store = ShardStore::new(root.clone());
    let key = sample_key();
    let path = store.path_for(&key, ".o");
    let hex = key.to_hex();
    let expected = root.join(&hex[0..1]).join(&hex[1..2]).join(format!("{}.o", &hex[2..]));
    assert_eq!(path, expected);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn install_bytes_is_atomic_and_readable() {
    let root = temp_root();
    let store = ShardStore::new(root.clone());
    let key = sample_key();

    let path = store.install_bytes(&key, ".o", b"object file contents").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"object file contents");

    let tag = store.shard_dir(&key).join("CACHEDIR.TAG");
    assert!(tag.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn delete_family_removes_all_sibling_extensions() {
    let root = temp_root();
    let store = ShardStore::new(root.clone());
    let key = sample_key();

    store.install_bytes(&key, ".o", b"obj").unwrap();
    store.install_bytes(&key, ".stderr", b"").unwrap();
    store.install_bytes(&key, ".d", b"deps").unwrap();

    let freed = store.delete_family(&key).unwrap();
    assert!(freed > 0);
    assert!(!store.path_for(&key, ".o").exists());
    assert!(!store.path_for(&key, ".stderr").exists());
    assert!(!store.path_for(&key, ".d").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn copy_out_prefers_hard_link_and_reports_missing_source() {
    let root = temp_root();
    let store = ShardStore::new(root.clone());
    let key = sample_key();
    let source = store.install_bytes(&key, ".o", b"obj").unwrap();

    let dest = root.join("out.o");
    assert!(store.copy_out(&source, &dest, true).unwrap());
    assert_eq!(fs::read(&dest).unwrap(), b"obj");

    let missing_source = root.join("does-not-exist.o");
    assert!(!store.copy_out(&missing_source, &root.join("out2.o"), true).unwrap());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn all_shard_ids_covers_every_two_hex_digit_prefix() {
    let store = ShardStore::new(PathBuf::from("/tmp/unused"));
    let ids = store.all_shard_ids();
    assert_eq!(ids.len(), 256);
    assert!(ids.contains(&"00".to_string()));
    assert!(ids.contains(&"ff".to_string()));
}

#[test]
fn rounded_file_size_rounds_up_to_block() {
    assert_eq!(rounded_file_size(0), 0);
    assert_eq!(rounded_file_size(1), 4096);
    assert_eq!(rounded_file_size(4096), 4096);
    assert_eq!(rounded_file_size(4097), 8192);
}

#[test]
fn temp_install_drop_without_commit_cleans_up() {
    let root = temp_root();
    let target = root.join("orphan.o");
    {
        let mut install = TempInstall::create(&target).unwrap();
        install.write_all(b"partial").unwrap();
        // Dropped without commit.
    }
    assert!(!target.exists());
    let remaining: Vec<_> = fs::read_dir(&root).unwrap().collect();
    assert!(remaining.is_empty(), "temp file should have been unlinked");

    let _ = fs::remove_dir_all(&root);
}
