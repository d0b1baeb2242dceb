// SPDX-License-Identifier: MIT

//! Per-shard append-only integer counters.
//!
//! Grounded in `Counters.cpp`/`stats.cpp`: a dense, growable vector of
//! non-negative integers addressed by a fixed enumeration. The on-disk
//! format is one decimal integer per line, positional; readers tolerate
//! files with more (or fewer) lines than they know about so the format can
//! grow without breaking older or newer binaries reading the same file.

use std::fs;
use std::path::Path;

use crate::lock;

/// Fixed enumeration of counter positions, mirroring `enum stats` in
/// `stats.hpp`. `Field::Count` is never itself a valid position; it marks
/// the length of the known-field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Field {
    Stdout = 0,
    Status = 1,
    InternalError = 2,
    CacheMiss = 3,
    PreprocessorError = 4,
    CompileFailed = 5,
    MissingCacheFile = 6,
    HitPreprocessor = 7,
    BadCompilerArguments = 8,
    CalledForLink = 9,
    FilesInCache = 10,
    CacheSizeKib = 11,
    ObsoleteMaxFiles = 12,
    ObsoleteMaxSize = 13,
    UnsupportedSourceLanguage = 14,
    BadOutputFile = 15,
    NoInputFile = 16,
    MultipleSourceFiles = 17,
    AutoconfTest = 18,
    UnsupportedOption = 19,
    OutputToStdout = 20,
    HitDirect = 21,
    NoOutputFile = 22,
    EmptyOutput = 23,
    BadExtraFile = 24,
    CompilerCheckFailed = 25,
    CantUsePch = 26,
    Preprocessing = 27,
    CleanupsRun = 28,
    UnsupportedDirective = 29,
    ZeroTimestamp = 30,
    CantUseModules = 31,
}

/// Number of statically known fields. The counters vector may be longer
/// (forward compatibility with newer writers) but never needs to be
/// shorter than this for a field to be read as zero.
pub const KNOWN_FIELDS: usize = 32;

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Stdout => "stdout",
            Field::Status => "status",
            Field::InternalError => "internal_error",
            Field::CacheMiss => "cache_miss",
            Field::PreprocessorError => "preprocessor_error",
            Field::CompileFailed => "compile_failed",
            Field::MissingCacheFile => "missing_cache_file",
            Field::HitPreprocessor => "cache_hit_preprocessed",
            Field::BadCompilerArguments => "bad_compiler_arguments",
            Field::CalledForLink => "called_for_link",
            Field::FilesInCache => "files_in_cache",
            Field::CacheSizeKib => "cache_size_kibibyte",
            Field::ObsoleteMaxFiles => "obsolete_max_files",
            Field::ObsoleteMaxSize => "obsolete_max_size",
            Field::UnsupportedSourceLanguage => "unsupported_source_language",
            Field::BadOutputFile => "bad_output_file",
            Field::NoInputFile => "no_input_file",
            Field::MultipleSourceFiles => "multiple_source_files",
            Field::AutoconfTest => "autoconf_test",
            Field::UnsupportedOption => "unsupported_compiler_option",
            Field::OutputToStdout => "output_to_stdout",
            Field::HitDirect => "cache_hit_direct",
            Field::NoOutputFile => "no_output_file",
            Field::EmptyOutput => "empty_output",
            Field::BadExtraFile => "bad_extra_file",
            Field::CompilerCheckFailed => "compiler_check_failed",
            Field::CantUsePch => "unsupported_precompiled_header",
            Field::Preprocessing => "preprocessing",
            Field::CleanupsRun => "cleanups_performed",
            Field::UnsupportedDirective => "unsupported_code_directive",
            Field::ZeroTimestamp => "stats_zeroed_timestamp",
            Field::CantUseModules => "could_not_use_modules",
        }
    }

    /// Fields whose semantics are "current value", not "accumulated delta" —
    /// a flush should *set*, never add to, these positions.
    pub fn is_absolute(self) -> bool {
        matches!(
            self,
            Field::FilesInCache
                | Field::CacheSizeKib
                | Field::ObsoleteMaxFiles
                | Field::ObsoleteMaxSize
                | Field::ZeroTimestamp
                | Field::CleanupsRun
        )
    }
}

/// A dense, growable vector of non-negative counters.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    values: Vec<u64>,
}

impl Counters {
    pub fn new() -> Self {
        Self { values: vec![0; KNOWN_FIELDS] }
    }

    pub fn get(&self, field: Field) -> u64 {
        self.values.get(field as usize).copied().unwrap_or(0)
    }

    pub fn set_mut(&mut self, field: Field, value: u64) {
        self.ensure_len(field as usize + 1);
        self.values[field as usize] = value;
    }

    pub fn increment(&mut self, field: Field, delta: i64) {
        self.ensure_len(field as usize + 1);
        let current = self.values[field as usize] as i64;
        self.values[field as usize] = (current + delta).max(0) as u64;
    }

    fn ensure_len(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, 0);
        }
    }

    pub fn all_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0)
    }

    /// Merge `delta`'s values into `self` in place, per field rules (most
    /// fields accumulate, absolute fields are overwritten by the delta's
    /// value if present).
    pub fn apply_delta(&mut self, delta: &Counters) {
        self.ensure_len(delta.values.len());
        for (i, &v) in delta.values.iter().enumerate() {
            if v == 0 {
                continue;
            }
            let is_absolute = i < KNOWN_FIELDS && KNOWN_ABSOLUTE[i];
            if is_absolute {
                self.values[i] = v;
            } else {
                self.values[i] = self.values[i].saturating_add(v);
            }
        }
    }

    /// Serialize to the on-disk text format: one decimal integer per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for v in &self.values {
            out.push_str(&v.to_string());
            out.push('\n');
        }
        out
    }

    /// Parse the on-disk text format. Non-decimal or malformed lines yield
    /// `0` for that position rather than failing the whole read — a
    /// partially corrupt counters file should degrade to zero counters, not
    /// crash the invocation.
    pub fn from_text(text: &str) -> Self {
        let values = text
            .lines()
            .map(|line| line.trim().parse::<u64>().unwrap_or(0))
            .collect();
        Self { values }
    }
}

const KNOWN_ABSOLUTE: [bool; KNOWN_FIELDS] = {
    let mut table = [false; KNOWN_FIELDS];
    table[Field::FilesInCache as usize] = true;
    table[Field::CacheSizeKib as usize] = true;
    table[Field::ObsoleteMaxFiles as usize] = true;
    table[Field::ObsoleteMaxSize as usize] = true;
    table[Field::ZeroTimestamp as usize] = true;
    table[Field::CleanupsRun as usize] = true;
    table
};

/// Read a shard's counters file, tolerating a missing file (zero counters).
pub fn read(path: &Path) -> Counters {
    match fs::read_to_string(path) {
        Ok(text) => Counters::from_text(&text),
        Err(_) => Counters::new(),
    }
}

/// Read-modify-write a shard's counters file under its lock, applying
/// `delta` and returning the resulting counters. Returns `None` if the lock
/// could not be acquired (the delta is lost; callers should log and move
/// on rather than block the invocation indefinitely).
pub fn flush(path: &Path, delta: &Counters) -> Option<Counters> {
    let guard = lock::acquire(path)?;
    let mut current = read(path);
    current.apply_delta(delta);

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("tmp");
    if fs::write(&tmp, current.to_text()).is_ok() {
        let _ = fs::rename(&tmp, path);
    }
    drop(guard);
    Some(current)
}

/// Zero every position except the absolute ones (`files_in_cache`,
/// `cache_size_kibibyte`, the obsolete limit fields), and set
/// `stats_zeroed_timestamp` to `now`. Used by `-z`/`--zero-stats`.
pub fn zero(counters: &mut Counters, now: u64) {
    for i in 0..counters.values.len() {
        let is_absolute = i < KNOWN_FIELDS && KNOWN_ABSOLUTE[i];
        if !is_absolute {
            counters.values[i] = 0;
        }
    }
    counters.set_mut(Field::ZeroTimestamp, now);
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
