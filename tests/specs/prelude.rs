//! Shared fixture helpers for the black-box `ccwrap` specs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub use assert_cmd::prelude::*;
pub use predicates;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn ccwrap_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("ccwrap"))
}

/// A `ccwrap` invocation is only as good as the cache directory and compiler
/// it's pointed at; `Project` bundles a scratch directory holding both plus
/// the source tree under test.
pub struct Project {
    pub dir: tempfile::TempDir,
}

impl Project {
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("cache")).expect("create cache dir");
        Self { dir }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path("cache")
    }

    pub fn file(&self, rel: &str, contents: &str) -> &Self {
        let full = self.path(rel);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&full, contents).expect("write fixture file");
        self
    }

    /// Write a fake "compiler" shell script: `-E` prints fixed preprocessed
    /// text to stdout, `-c -o <path>` writes deterministic bytes to
    /// `<path>`, anything else (link invocations) just exits 0. Good enough
    /// to drive the wrapper end to end without a real C toolchain.
    pub fn fake_compiler(&self) -> PathBuf {
        let path = self.path("fake-cc");
        let script = r#"#!/bin/sh
for arg in "$@"; do
    if [ "$arg" = "-E" ]; then
        echo 'int main(void) { return 0; }'
        exit 0
    fi
done
out=""
prev=""
for arg in "$@"; do
    if [ "$prev" = "-o" ]; then
        out="$arg"
    fi
    prev="$arg"
done
if [ -n "$out" ]; then
    printf 'OBJ' > "$out"
fi
exit 0
"#;
        fs::write(&path, script).expect("write fake compiler");
        set_executable(&path);
        path
    }

    /// `ccwrap` invoked in prefix mode against this project's fake compiler
    /// and cache directory, cwd set to the project root. `find_compiler`
    /// only resolves an explicit `config.compiler` or a PATH search by
    /// basename, so the fake compiler's absolute path is pinned via
    /// `CCACHE_COMPILER` rather than relying on `argv0` alone.
    pub fn ccwrap(&self) -> Command {
        let compiler = self.fake_compiler();
        let mut cmd = ccwrap_cmd();
        cmd.current_dir(self.dir.path());
        cmd.env("CCACHE_DIR", self.cache_dir());
        cmd.env("CCACHE_COMPILER", &compiler);
        cmd.arg(compiler);
        cmd
    }

    /// `ccwrap` invoked in administrative mode (no compiler prefix).
    pub fn ccwrap_admin(&self) -> Command {
        let mut cmd = ccwrap_cmd();
        cmd.current_dir(self.dir.path());
        cmd.env("CCACHE_DIR", self.cache_dir());
        cmd
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("stat fixture").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fixture");
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) {}
