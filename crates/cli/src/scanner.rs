// SPDX-License-Identifier: MIT

//! Preprocessed-source scanning: recognizes line markers in the
//! preprocessor's stdout, rewrites include paths, and builds the set of
//! [`IncludeEntry`] records that feed the manifest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::context::Context;
use crate::digest::Hasher;
use crate::manifest::IncludeEntry;

/// A scan outcome that must force a cache miss rather than merely skip an
/// include file, with a human-readable reason for statistics/logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedMiss {
    /// `.incbin` directive references an untracked binary dependency.
    IncbinDirective,
    /// An included file's mtime/ctime raced the compile.
    IncludeFileRace,
}

impl ForcedMiss {
    pub fn reason(self) -> &'static str {
        match self {
            ForcedMiss::IncbinDirective => "unsupported_directive",
            ForcedMiss::IncludeFileRace => "include_file_race",
        }
    }
}

/// Result of scanning one preprocessor run.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub includes: Vec<IncludeEntry>,
    pub saw_absolute_include: bool,
}

fn to_i64_time(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(-1)
}

/// The inode change time (`st_ctime`), matching what the reference
/// implementation stores alongside mtime for the include-file race guard.
#[cfg(unix)]
fn file_ctime(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime()
}

#[cfg(not(unix))]
fn file_ctime(meta: &fs::Metadata) -> i64 {
    meta.modified().map(to_i64_time).unwrap_or(-1)
}

/// Rewrite `path` to be relative to `cwd` when it falls under `base_dir`.
fn rewrite_path(path: &Path, base_dir: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(base) = base_dir {
        if let Ok(rest) = path.strip_prefix(base) {
            if let Ok(rel) = pathdiff(cwd, base) {
                return rel.join(rest);
            }
        }
    }
    path.to_path_buf()
}

/// Minimal lexical "relative path from `from` to `base`" helper: only needs
/// to handle the case where `base` is an ancestor of, or equal to, `from`,
/// which is the only shape `rewrite_path` calls it with.
fn pathdiff(from: &Path, base: &Path) -> Result<PathBuf, ()> {
    if let Ok(rest) = from.strip_prefix(base) {
        let ups = rest.components().count();
        let mut out = PathBuf::new();
        for _ in 0..ups {
            out.push("..");
        }
        return Ok(out);
    }
    Err(())
}

/// Recognize one preprocessor line-marker line, returning the referenced
/// path and whether it is flagged as a system header (gcc flag `3`).
fn parse_line_marker(line: &str) -> Option<(&str, bool)> {
    let line = line.trim_start();

    if let Some(rest) = line.strip_prefix('#') {
        let rest = rest.trim_start();
        // `# <N> "path" [flags...]` or `#line <N> "path"`.
        let rest = rest.strip_prefix("line").map(str::trim_start).unwrap_or(rest);
        let mut chars = rest.chars();
        if chars.next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            let after_digits = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let after_digits = after_digits.trim_start();
            if let Some(quoted) = after_digits.strip_prefix('"') {
                if let Some(end) = quoted.find('"') {
                    let path = &quoted[..end];
                    let flags = &quoted[end + 1..];
                    let is_system = flags.split_whitespace().any(|f| f == "3");
                    return Some((path, is_system));
                }
            }
        }
    }

    if let Some(rest) = line.strip_prefix("#pragma GCC pch_preprocess") {
        let rest = rest.trim_start();
        if let Some(quoted) = rest.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                return Some((&quoted[..end], false));
            }
        }
    }

    None
}

fn is_distcc_pump_banner(line: &str) -> bool {
    line.starts_with("__________") || line.starts_with("----------")
}

fn should_skip_include(path: &str, primary_input: &Path, config: &Config) -> bool {
    if path.starts_with('<') && path.ends_with('>') {
        return true;
    }
    let candidate = Path::new(path);
    if candidate == primary_input {
        return true;
    }
    if config.ignore_headers_in_manifest.iter().any(|p| p == candidate) {
        return true;
    }
    match fs::symlink_metadata(candidate) {
        Ok(meta) => !meta.is_file(),
        Err(_) => true,
    }
}

/// Scan a preprocessor run's stdout. Feeds a canonicalized copy of the
/// stream (banner lines stripped) into `hasher` under the `"cpp"` tag, and
/// returns the discovered include entries, or a [`ForcedMiss`].
pub fn scan(
    hasher: &mut Hasher,
    cpp_output: &[u8],
    primary_input: &Path,
    ctx: &Context,
) -> Result<ScanOutcome, ForcedMiss> {
    let text = String::from_utf8_lossy(cpp_output);
    let mut outcome = ScanOutcome::default();
    let mut canonical = String::with_capacity(text.len());
    let dump_included = std::env::var_os("CCACHE_DEBUG_INCLUDED").is_some();

    for line in text.lines() {
        if is_distcc_pump_banner(line) {
            continue;
        }
        if line.contains(".incbin") {
            return Err(ForcedMiss::IncbinDirective);
        }

        canonical.push_str(line);
        canonical.push('\n');

        let Some((raw_path, is_system)) = parse_line_marker(line) else { continue };
        if raw_path == "<command-line>" || raw_path == "<built-in>" {
            continue;
        }

        if should_skip_include(raw_path, primary_input, &ctx.config) {
            continue;
        }
        if is_system && ctx.config.sloppiness.system_headers {
            continue;
        }

        let original = Path::new(raw_path);
        if original.is_absolute() {
            outcome.saw_absolute_include = true;
        }
        let rewritten = rewrite_path(original, ctx.config.base_dir.as_deref(), &ctx.cwd);
        let rewritten_str = rewritten.to_string_lossy().to_string();

        if ctx.included_files.contains(&rewritten_str)
            || outcome.includes.iter().any(|e| e.path == rewritten_str)
        {
            continue;
        }

        let lookup_path = if original.is_absolute() { original.to_path_buf() } else { rewritten.clone() };
        let Ok(meta) = fs::metadata(&lookup_path) else { continue };

        let mtime = meta.modified().map(to_i64_time).unwrap_or(-1);
        let ctime = file_ctime(&meta);

        let compile_start = to_i64_time(ctx.compile_start);
        if mtime >= compile_start && !ctx.config.sloppiness.include_file_mtime {
            return Err(ForcedMiss::IncludeFileRace);
        }
        if ctime >= compile_start && !ctx.config.sloppiness.include_file_ctime {
            return Err(ForcedMiss::IncludeFileRace);
        }

        if dump_included {
            println!("{rewritten_str}");
        }

        let Ok(mut file_hasher) = content_digest(&lookup_path) else { continue };
        let digest = file_hasher.finalize();

        outcome.includes.push(IncludeEntry {
            path: rewritten_str,
            digest,
            size: meta.len(),
            mtime,
            ctime,
        });
    }

    hasher.delimiter("cpp");
    hasher.append(canonical.as_bytes());

    Ok(outcome)
}

fn content_digest(path: &Path) -> std::io::Result<Hasher> {
    let mut h = Hasher::new();
    h.append_file(path)?;
    Ok(h)
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
