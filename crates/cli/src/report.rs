// SPDX-License-Identifier: MIT

//! Human-readable and machine-parseable rendering of accumulated
//! [`Counters`], grounded in `stats.cpp`'s `stats_info` table: each field
//! carries both a `--print-stats` machine key (already `Field::name()`)
//! and a `--show-stats` human message, listed here in display order.

use std::fmt::Write as _;

use crate::config::Config;
use crate::stats::{Counters, Field, KNOWN_FIELDS};

/// Fields shown by `--show-stats`/`--print-stats`, in display order. A few
/// fields carry no useful display (the obsolete max-files/max-size slots)
/// and are omitted entirely rather than printed as "OBSOLETE".
const DISPLAY_FIELDS: &[Field] = &[
    Field::ZeroTimestamp,
    Field::HitDirect,
    Field::HitPreprocessor,
    Field::CacheMiss,
    Field::CalledForLink,
    Field::Preprocessing,
    Field::MultipleSourceFiles,
    Field::Stdout,
    Field::NoOutputFile,
    Field::EmptyOutput,
    Field::CompileFailed,
    Field::InternalError,
    Field::PreprocessorError,
    Field::CantUsePch,
    Field::CantUseModules,
    Field::CompilerCheckFailed,
    Field::MissingCacheFile,
    Field::BadCompilerArguments,
    Field::UnsupportedSourceLanguage,
    Field::AutoconfTest,
    Field::UnsupportedOption,
    Field::UnsupportedDirective,
    Field::OutputToStdout,
    Field::BadOutputFile,
    Field::NoInputFile,
    Field::BadExtraFile,
    Field::CleanupsRun,
    Field::FilesInCache,
    Field::CacheSizeKib,
];

/// The `--show-stats` human message for a field, matching the reference
/// tool's wording exactly.
fn human_message(field: Field) -> &'static str {
    match field {
        Field::Status => "status",
        Field::ZeroTimestamp => "stats zeroed",
        Field::HitDirect => "cache hit (direct)",
        Field::HitPreprocessor => "cache hit (preprocessed)",
        Field::CacheMiss => "cache miss",
        Field::CalledForLink => "called for link",
        Field::Preprocessing => "called for preprocessing",
        Field::MultipleSourceFiles => "multiple source files",
        Field::Stdout => "compiler produced stdout",
        Field::NoOutputFile => "compiler produced no output",
        Field::EmptyOutput => "compiler produced empty output",
        Field::CompileFailed => "compile failed",
        Field::InternalError => "ccwrap internal error",
        Field::PreprocessorError => "preprocessor error",
        Field::CantUsePch => "can't use precompiled header",
        Field::CantUseModules => "can't use modules",
        Field::CompilerCheckFailed => "compiler check failed",
        Field::MissingCacheFile => "cache file missing",
        Field::BadCompilerArguments => "bad compiler arguments",
        Field::UnsupportedSourceLanguage => "unsupported source language",
        Field::AutoconfTest => "autoconf compile/link",
        Field::UnsupportedOption => "unsupported compiler option",
        Field::UnsupportedDirective => "unsupported code directive",
        Field::OutputToStdout => "output to stdout",
        Field::BadOutputFile => "could not write to output file",
        Field::NoInputFile => "no input file",
        Field::BadExtraFile => "error hashing extra file",
        Field::CleanupsRun => "cleanups performed",
        Field::FilesInCache => "files in cache",
        Field::CacheSizeKib => "cache size",
        Field::ObsoleteMaxFiles | Field::ObsoleteMaxSize => "obsolete",
    }
}

/// Render a `value` for display, applying the one special-cased format:
/// `cache_size_kibibyte` is stored in KiB but shown as a human byte size.
fn format_value(field: Field, value: u64) -> String {
    if field == Field::CacheSizeKib {
        human_size(value * 1024)
    } else {
        value.to_string()
    }
}

/// Format a byte count the way `stats.cpp`'s `format_size` does: fixed
/// point, one decimal place, binary units once over 1 KiB.
fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Render accumulated counters as the `--show-stats` text table: one
/// right-aligned "message    value" line per non-zero (or always-shown)
/// field, plus a small header with the configured cache directory and
/// size limit.
pub fn render_stats(counters: &Counters, config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cache directory                {}", config.cache_dir.display());
    let _ = writeln!(out, "cache size limit                {}", human_size(config.max_size));
    if config.max_files > 0 {
        let _ = writeln!(out, "file limit                      {}", config.max_files);
    }
    let _ = writeln!(out);

    let width = DISPLAY_FIELDS.iter().map(|f| human_message(*f).len()).max().unwrap_or(0);
    for &field in DISPLAY_FIELDS {
        let value = counters.get(field);
        if value == 0 && !matches!(field, Field::FilesInCache | Field::CacheSizeKib) {
            continue;
        }
        let message = human_message(field);
        let _ = writeln!(out, "{message:<width$}  {}", format_value(field, value));
    }
    out
}

/// Render accumulated counters as `--print-stats`'s stable `key\tvalue`
/// lines, one per known field, unconditionally (unlike [`render_stats`],
/// zero-valued fields are not suppressed — scripts rely on seeing every
/// key every time).
pub fn render_stats_machine(counters: &Counters) -> String {
    let mut out = String::new();
    for index in 0..KNOWN_FIELDS {
        let Some(field) = field_from_index(index) else { continue };
        if matches!(field, Field::ObsoleteMaxFiles | Field::ObsoleteMaxSize) {
            continue;
        }
        let _ = writeln!(out, "{}\t{}", field.name(), counters.get(field));
    }
    out
}

/// Every statically known field, in index order — used by administrative
/// commands that need to sum counters across every shard.
pub fn all_fields() -> impl Iterator<Item = Field> {
    (0..KNOWN_FIELDS).filter_map(field_from_index)
}

fn field_from_index(index: usize) -> Option<Field> {
    const ALL: [Field; KNOWN_FIELDS] = [
        Field::Stdout,
        Field::Status,
        Field::InternalError,
        Field::CacheMiss,
        Field::PreprocessorError,
        Field::CompileFailed,
        Field::MissingCacheFile,
        Field::HitPreprocessor,
        Field::BadCompilerArguments,
        Field::CalledForLink,
        Field::FilesInCache,
        Field::CacheSizeKib,
        Field::ObsoleteMaxFiles,
        Field::ObsoleteMaxSize,
        Field::UnsupportedSourceLanguage,
        Field::BadOutputFile,
        Field::NoInputFile,
        Field::MultipleSourceFiles,
        Field::AutoconfTest,
        Field::UnsupportedOption,
        Field::OutputToStdout,
        Field::HitDirect,
        Field::NoOutputFile,
        Field::EmptyOutput,
        Field::BadExtraFile,
        Field::CompilerCheckFailed,
        Field::CantUsePch,
        Field::Preprocessing,
        Field::CleanupsRun,
        Field::UnsupportedDirective,
        Field::ZeroTimestamp,
        Field::CantUseModules,
    ];
    ALL.get(index).copied()
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
