// SPDX-License-Identifier: MIT

//! Hash assembly: the common hash both strategies share, plus the
//! direct-mode and preprocessor-mode extensions.

use std::path::Path;

use crate::args::SplitArgs;
use crate::config::CompilerCheck;
use crate::context::Context;
use crate::digest::{Digest, Hasher};
use crate::manifest::IncludeEntry;
use crate::scanner::ScanOutcome;

/// Version prefix bumped whenever the cache's on-disk semantics change in a
/// way that must invalidate every existing entry.
const HASH_VERSION: u64 = 1;

/// `__DATE__`/`__TIME__`/`__TIMESTAMP__` tokens. Their presence in the
/// source disables direct mode (the compiler's own output would depend on
/// wall-clock time, something the manifest cannot fingerprint) unless the
/// `time_macros` sloppiness is set.
const TIME_MACROS: &[&str] = &["__DATE__", "__TIME__", "__TIMESTAMP__"];

/// Environment variables that vary compiler output by locale; excluded from
/// the common hash when the `locale` sloppiness is set.
const LOCALE_ENV_VARS: &[&str] = &["LANG", "LC_ALL", "LC_CTYPE", "LC_MESSAGES"];

/// Version prefix for the direct-mode (manifest) extension, bumped
/// independently of [`HASH_VERSION`] whenever the ManifestKey's own
/// semantics change.
const MANIFEST_VERSION: u64 = 1;

/// Preprocessor search-path environment variables: changing any of these
/// can change which header a `#include` resolves to without changing the
/// source file itself, so a direct-mode hit must be sensitive to them.
const PREPROCESSOR_ENV_VARS: &[&str] =
    &["CPATH", "C_INCLUDE_PATH", "CPLUS_INCLUDE_PATH", "OBJC_INCLUDE_PATH", "OBJCPLUS_INCLUDE_PATH"];

fn compiler_identity(hasher: &mut Hasher, ctx: &Context, compiler: &Path) {
    hasher.delimiter("compiler_check");
    match &ctx.config.compiler_check {
        CompilerCheck::None => {}
        CompilerCheck::String(s) => {
            hasher.append(s.as_bytes());
        }
        CompilerCheck::Mtime => {
            if let Ok(meta) = std::fs::metadata(compiler) {
                if let Ok(modified) = meta.modified() {
                    if let Ok(d) = modified.duration_since(std::time::UNIX_EPOCH) {
                        hasher.append_int(d.as_secs());
                    }
                }
                hasher.append_int(meta.len());
            }
        }
        CompilerCheck::Content => {
            let _ = hasher.append_file(compiler);
        }
        CompilerCheck::Command(cmd) => {
            if let Ok(output) = std::process::Command::new(cmd).arg(compiler).output() {
                hasher.append(&output.stdout);
            }
        }
    }
}

/// Hash contributions shared by both direct and preprocessor mode: compiler
/// identity, build environment, and the argument vectors that affect
/// compiler behavior regardless of strategy.
pub fn common_hash(ctx: &Context, split: &SplitArgs) -> Hasher {
    let mut hasher = Hasher::new();
    hasher.delimiter("version");
    hasher.append_int(HASH_VERSION);

    hasher.delimiter("cpp_extension");
    hasher.append(ctx.config.cpp_extension.as_bytes());

    if let Some(compiler) = &ctx.compiler {
        compiler_identity(&mut hasher, ctx, compiler);
        hasher.delimiter("compiler_basename");
        if let Some(name) = compiler.file_name().and_then(|n| n.to_str()) {
            hasher.append(name.as_bytes());
        }
    }

    if !ctx.config.sloppiness.locale {
        hasher.delimiter("locale");
        for var in LOCALE_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                hasher.append(var.as_bytes());
                hasher.append(value.as_bytes());
            }
        }
    }

    hasher.delimiter("cwd");
    let cwd_str = ctx.cwd.to_string_lossy();
    if let Some(base) = &ctx.config.base_dir {
        if let Ok(rel) = ctx.cwd.strip_prefix(base) {
            hasher.append(rel.to_string_lossy().as_bytes());
        } else {
            hasher.append(cwd_str.as_bytes());
        }
    } else {
        hasher.append(cwd_str.as_bytes());
    }

    if split.flags.coverage {
        hasher.delimiter("coverage");
        hasher.append(split.output_file.as_deref().unwrap_or(Path::new("")).to_string_lossy().as_bytes());
    }

    if let Ok(colors) = std::env::var("GCC_COLORS") {
        hasher.delimiter("gcc_colors");
        hasher.append(colors.as_bytes());
    }

    for path in &ctx.config.extra_files_to_hash {
        hasher.delimiter("extra_file");
        let _ = hasher.append_file(path);
    }

    hasher.delimiter("common_args");
    for arg in &split.common_args {
        hasher.append(arg.as_bytes());
        hasher.append(&[0u8]);
    }

    hasher.delimiter("compiler_only_args");
    for arg in &split.compiler_only_args {
        hasher.append(arg.as_bytes());
        hasher.append(&[0u8]);
    }

    hasher
}

/// Whether the source text forces direct mode off, and why.
pub fn direct_mode_disabled(ctx: &Context, input_text: &[u8]) -> Option<&'static str> {
    if ctx.config.sloppiness.time_macros {
        return None;
    }
    let text = String::from_utf8_lossy(input_text);
    for marker in TIME_MACROS {
        if text.contains(marker) {
            return Some(marker);
        }
    }
    None
}

/// Extend a clone of the common hash with the direct-mode-specific
/// contribution (manifest key material): the manifest-version constant,
/// preprocessor-relevant environment variables, and input file path/content.
pub fn direct_mode_hash(common: &Hasher, split: &SplitArgs, source_bytes: &[u8]) -> Hasher {
    let mut hasher = common.clone_state();
    hasher.delimiter("manifest_version");
    hasher.append_int(MANIFEST_VERSION);
    hasher.delimiter("direct_mode_env");
    for var in PREPROCESSOR_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            hasher.append(var.as_bytes());
            hasher.append(value.as_bytes());
        }
    }
    hasher.delimiter("direct_mode_input_path");
    hasher.append(split.input_file.to_string_lossy().as_bytes());
    hasher.delimiter("direct_mode_input_content");
    hasher.append(source_bytes);
    hasher
}

/// Extend a clone of the scan hash (the common hash plus the scanner's
/// `"cpp"`-tagged canonicalized preprocessor output, see
/// [`crate::scanner::scan`]) with the remaining preprocessor-mode-specific
/// contribution: stderr and the discovered include entries.
pub fn preprocessor_mode_hash(scan_hasher: &Hasher, scan: &ScanOutcome, stderr: &[u8]) -> Hasher {
    let mut hasher = scan_hasher.clone_state();
    hasher.delimiter("preprocessor_stderr");
    hasher.append(stderr);
    hasher.delimiter("preprocessor_includes");
    for entry in &scan.includes {
        hash_include_entry(&mut hasher, entry);
    }
    hasher
}

fn hash_include_entry(hasher: &mut Hasher, entry: &IncludeEntry) {
    hasher.append(entry.path.as_bytes());
    hasher.append(entry.digest.as_bytes());
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
