// SPDX-License-Identifier: MIT

use super::*;

fn temp_output() -> PathBuf {
    std::env::temp_dir().join(format!(
        "ccwrap-debug-test-{}-{}.o",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn debug_log_flush_writes_recorded_lines() {
    let output = temp_output();
    let mut log = DebugLog::new();
    log.record("step one");
    log.record("step two");
    log.flush(&output).unwrap();

    let path = artifact_path(&output, "ccache-log");
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, "step one\nstep two");
    let _ = fs::remove_file(path);
}

#[test]
fn write_input_snapshot_writes_exact_bytes() {
    let output = temp_output();
    write_input_snapshot(&output, "d", b"direct-mode-bytes").unwrap();
    let path = artifact_path(&output, "ccache-input-d");
    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes, b"direct-mode-bytes");
    let _ = fs::remove_file(path);
}

#[test]
fn hash_debug_disabled_by_default() {
    // Assumes the ambient test environment does not set this variable.
    let mut hasher = Hasher::new();
    let output = temp_output();
    let enabled = maybe_enable_hash_debug(&mut hasher, &output).unwrap();
    assert!(!enabled);
}
