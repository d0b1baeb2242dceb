// SPDX-License-Identifier: MIT

//! Debug artifact writers: `<output>.ccache-input-{text,c,d,p}` and
//! `<output>.ccache-log`, plus the `CCACHE_DEBUG_HASH` sink wiring for the
//! hasher.
//!
//! The `CCACHE_DEBUG_INCLUDED` stdout dump lives in [`crate::scanner`],
//! where the discovery happens; this module owns the artifacts that are
//! written once, after an invocation completes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::digest::Hasher;

/// A per-invocation debug log buffer, flushed to `<output>.ccache-log` on
/// drop-equivalent (explicit `flush`) rather than line-by-line, since the
/// output path is only known after argument splitting.
#[derive(Debug, Default)]
pub struct DebugLog {
    lines: Vec<String>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn flush(&self, output_file: &Path) -> io::Result<()> {
        let path = artifact_path(output_file, "ccache-log");
        fs::write(path, self.lines.join("\n"))
    }
}

fn artifact_path(output_file: &Path, suffix: &str) -> PathBuf {
    let mut name = output_file.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Enable `CCACHE_DEBUG_HASH` mirroring on `hasher`, writing to
/// `<output>.ccache-input-text`, if the environment variable is set.
pub fn maybe_enable_hash_debug(hasher: &mut Hasher, output_file: &Path) -> io::Result<bool> {
    if std::env::var_os("CCACHE_DEBUG_HASH").is_none() {
        return Ok(false);
    }
    let path = artifact_path(output_file, "ccache-input-text");
    hasher.enable_debug(&path)?;
    Ok(true)
}

/// Write a binary snapshot of one hash stage's raw bytes to
/// `<output>.ccache-input-<kind>` (`kind` is `c`, `d`, or `p` per the
/// reference implementation's convention: compiler-invocation, direct-mode,
/// preprocessor-mode).
pub fn write_input_snapshot(output_file: &Path, kind: &str, bytes: &[u8]) -> io::Result<()> {
    let suffix = format!("ccache-input-{kind}");
    fs::write(artifact_path(output_file, &suffix), bytes)
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
