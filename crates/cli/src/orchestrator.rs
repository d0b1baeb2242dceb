// SPDX-License-Identifier: MIT

//! The top-level state machine: one invocation's lookup, miss handling, and
//! cache population, driving every other component.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::args::{self, SplitArgs};
use crate::context::Context;
use crate::debug::{self, DebugLog};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::exec;
use crate::hash;
use crate::manifest::{self, IncludeEntry, Manifest};
use crate::scanner::{self, ForcedMiss};
use crate::shard::ShardStore;
use crate::stats::{Counters, Field};

/// Outcome of one invocation, for the benefit of `main`'s process-exit
/// decision. A fallback never reaches this far: [`exec::fallback`] either
/// replaces the process image or propagates an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Installed from cache; the caller should exit 0.
    Hit,
    /// Ran the real compiler; carries its exit status.
    Compiled(i32),
}

/// Find the real compiler binary to invoke: an explicit `compiler` config
/// value wins, otherwise the first `$PATH` entry sharing `argv0`'s basename
/// whose canonicalized path is not this binary itself (symlink invocation),
/// falling back to treating `argv0` as already being the intended compiler.
pub fn find_compiler(ctx: &Context, argv0: &str) -> Result<PathBuf> {
    if let Some(explicit) = &ctx.config.compiler {
        return which(explicit).ok_or_else(|| Error::CompilerNotFound(explicit.clone()));
    }

    let basename = Path::new(argv0).file_name().and_then(|n| n.to_str()).unwrap_or(argv0);
    let self_path = std::env::current_exe().ok();

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(basename);
            if !candidate.is_file() {
                continue;
            }
            let candidate_real = fs::canonicalize(&candidate).unwrap_or_else(|_| candidate.clone());
            let is_self = self_path
                .as_ref()
                .and_then(|p| fs::canonicalize(p).ok())
                .map(|p| p == candidate_real)
                .unwrap_or(false);
            if !is_self {
                return Ok(candidate);
            }
        }
    }

    Err(Error::CompilerNotFound(basename.to_string()))
}

fn which(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() || name.contains('/') {
        return path.is_file().then(|| path.to_path_buf());
    }
    let path_var = std::env::var("PATH").ok()?;
    std::env::split_paths(&path_var).map(|dir| dir.join(name)).find(|p| p.is_file())
}

/// Shard counters accumulated over the course of one invocation, flushed
/// once at the end regardless of outcome.
struct StatsAccumulator {
    store: ShardStore,
    per_shard: std::collections::HashMap<String, Counters>,
    enabled: bool,
}

impl StatsAccumulator {
    fn new(store: ShardStore, enabled: bool) -> Self {
        Self { store, per_shard: std::collections::HashMap::new(), enabled }
    }

    fn bump(&mut self, shard_id: &str, field: Field, delta: i64) {
        if !self.enabled {
            return;
        }
        self.per_shard.entry(shard_id.to_string()).or_insert_with(Counters::new).increment(field, delta);
    }

    /// Bump a counter with no natural shard (an error detected before any
    /// object key exists). Parked under a fixed, otherwise-unused bucket
    /// rather than a real content shard.
    fn bump_global(&mut self, field: Field) {
        self.bump("00", field, 1);
    }

    fn flush(&self) {
        if !self.enabled {
            return;
        }
        for (shard_id, delta) in &self.per_shard {
            let path = self.store.stats_path_for_id(shard_id);
            crate::stats::flush(&path, delta);
        }
    }
}

/// Strip internal `--ccache-*` flags from an argument vector before an
/// `exec` fallback, so the real compiler never sees them.
fn strip_internal_flags(args: &[String]) -> Vec<String> {
    args.iter().filter(|a| !a.starts_with("--ccache-")).cloned().collect()
}

/// Fall back: flush accumulated counters, then `exec` the real compiler
/// with the original argument vector. Only returns on `exec` failure (a
/// fallback-fatal condition the caller must report and exit non-zero for).
/// Callers bump the relevant counter themselves before calling this.
fn fall_back(stats: &StatsAccumulator, compiler: &str, raw_args: &[String]) -> Error {
    stats.flush();
    let args = strip_internal_flags(raw_args);
    match exec::fallback(compiler, &args) {
        Ok(never) => match never {},
        Err(io_err) => Error::CompilerNotFound(format!("{compiler}: {io_err}")),
    }
}

/// Run one invocation end-to-end. `argv0` is the program name used to
/// invoke us (for symlink-mode compiler discovery); `raw_args` is the full
/// remaining argument vector (compiler args, or `<compiler> <args...>` in
/// prefix mode — callers are expected to have already stripped a leading
/// `ccache`/`ccwrap` token in prefix mode).
pub fn run(ctx: &mut Context, argv0: &str, raw_args: &[String]) -> Result<Outcome> {
    let store = ShardStore::new(ctx.config.cache_dir.clone());
    let mut stats = StatsAccumulator::new(store.clone(), ctx.config.stats);

    // Step 2: find compiler.
    let compiler_path = match find_compiler(ctx, argv0) {
        Ok(p) => p,
        Err(e) => return Err(e),
    };
    ctx.compiler = Some(compiler_path.clone());
    let compiler_str = compiler_path.to_string_lossy().to_string();

    if ctx.config.disable {
        let e = fall_back(&stats, &compiler_str, raw_args);
        return Err(e);
    }

    // Step 3: split.
    let split = match args::split(&compiler_str, raw_args, ctx.config.base_dir.as_deref(), &ctx.cwd) {
        Ok(s) => s,
        Err(err) => {
            let field = field_for_split_error(&err);
            stats.bump_global(field);
            return Err(fall_back(&stats, &compiler_str, raw_args));
        }
    };

    if split.flags.saw_prefix_map {
        // Presence-only: no additional handling needed here, already
        // folded into the hash by `args::split`'s rewrite.
    }

    let result = run_with_split(ctx, &store, &mut stats, &compiler_str, raw_args, &split);
    stats.flush();
    result
}

fn field_for_split_error(err: &Error) -> Field {
    match err {
        Error::CalledForLink => Field::CalledForLink,
        Error::NoInputFile => Field::NoInputFile,
        Error::MultipleSourceFiles => Field::MultipleSourceFiles,
        Error::AutoconfTest => Field::AutoconfTest,
        Error::UnsupportedOption(_) => Field::UnsupportedOption,
        Error::UnsupportedSourceLanguage(_) => Field::UnsupportedSourceLanguage,
        Error::PreprocessingOnly => Field::Preprocessing,
        Error::TooHardToCache(_) => Field::UnsupportedDirective,
        Error::Io { .. } => Field::InternalError,
        _ => Field::BadCompilerArguments,
    }
}

#[allow(clippy::too_many_lines)]
fn run_with_split(
    ctx: &mut Context,
    store: &ShardStore,
    stats: &mut StatsAccumulator,
    compiler: &str,
    raw_args: &[String],
    split: &SplitArgs,
) -> Result<Outcome> {
    let mut debug_log = DebugLog::new();
    let debug_enabled = ctx.config.debug;

    // Step 4: common hash.
    let common = hash::common_hash(ctx, split);
    if debug_enabled {
        if let Some(output) = &split.output_file {
            let _ = debug::maybe_enable_hash_debug(&mut common.clone_state(), output);
        }
        debug_log.record("computed common hash");
    }

    let source_bytes = fs::read(absolute(ctx, &split.input_file)).unwrap_or_default();
    let direct_mode_reason = hash::direct_mode_disabled(ctx, &source_bytes);
    let direct_mode_enabled = ctx.config.direct_mode && direct_mode_reason.is_none() && !ctx.config.recache;

    // Step 5: direct lookup.
    let mut manifest_path: Option<PathBuf> = None;
    let mut manifest_value: Option<Manifest> = None;
    let mut direct_hit_key: Option<Digest> = None;

    if direct_mode_enabled {
        let direct_hasher = hash::direct_mode_hash(&common, split, &source_bytes);
        let manifest_key = direct_hasher.finalize();
        let path = store.path_for(&manifest_key, ".manifest");
        if let Some(m) = manifest::load(&path) {
            let key = m.get(|entry| matches_on_disk(ctx, entry));
            manifest_value = Some(m);
            manifest_path = Some(path);
            direct_hit_key = key;
        } else {
            manifest_path = Some(path);
        }
    }

    if let Some(object_key) = direct_hit_key {
        if let Some(path) = &manifest_path {
            let _ = manifest::touch(path);
        }
        if install_from_cache(store, &object_key, split, ctx)? {
            stats.bump(&store.shard_id(&object_key), Field::HitDirect, 1);
            return Ok(Outcome::Hit);
        }
        // Missing sibling: family deleted inside install_from_cache, fall
        // through to a regular preprocessor-mode miss.
    }

    // Step 6: preprocess.
    let mut cpp_args = Vec::new();
    cpp_args.push("-E".to_string());
    if ctx.config.keep_comments_cpp {
        cpp_args.push("-C".to_string());
    }
    cpp_args.extend(split.cpp_args.iter().cloned());
    cpp_args.extend(split.common_args.iter().cloned());
    cpp_args.extend(split.compiler_only_args.iter().cloned());

    let cpp_output = exec::run_preprocessor(compiler, &cpp_args, &ctx.cwd, &ctx.config.prefix_command_cpp)
        .map_err(|e| Error::Io { path: PathBuf::from(compiler), source: e })?;

    if !cpp_output.status.success() {
        stats.bump_global(Field::PreprocessorError);
        return Err(fall_back(stats, compiler, raw_args));
    }

    // Step 7: preprocessor hash. Seed the scan hasher from the common hash
    // so the scanner's "cpp" tag (the canonicalized preprocessor output)
    // folds into the same state `preprocessor_mode_hash` extends below —
    // otherwise two different sources compiled with identical flags would
    // hash identically.
    let mut scan_hasher = common.clone_state();
    let scan_outcome = scanner::scan(&mut scan_hasher, &cpp_output.stdout, &split.input_file, ctx);

    let scan_outcome = match scan_outcome {
        Ok(outcome) => outcome,
        Err(ForcedMiss::IncbinDirective) => {
            stats.bump_global(Field::UnsupportedDirective);
            return Err(fall_back(stats, compiler, raw_args));
        }
        Err(ForcedMiss::IncludeFileRace) => {
            stats.bump_global(Field::CacheMiss);
            scanner::ScanOutcome::default()
        }
    };

    for entry in &scan_outcome.includes {
        ctx.included_files.insert(entry.clone());
    }

    let preprocessor_hasher =
        hash::preprocessor_mode_hash(&scan_hasher, &scan_outcome, &cpp_output.stderr);
    let object_key = preprocessor_hasher.finalize();
    let shard_id = store.shard_id(&object_key);

    // Step 8: consistency check.
    if let (Some(path), Some(manifest)) = (&manifest_path, &manifest_value) {
        let recorded = manifest.get(|entry| matches_on_disk(ctx, entry));
        if let Some(recorded_key) = recorded {
            if recorded_key != object_key {
                let _ = fs::remove_file(path);
                manifest_value = Some(Manifest::new());
            }
        }
    }

    // Install-from-cache via the preprocessor-derived key (a second chance
    // at a hit when direct mode missed or was disabled).
    if install_from_cache(store, &object_key, split, ctx)? {
        stats.bump(&shard_id, Field::HitPreprocessor, 1);
        if let Some(path) = &manifest_path {
            maybe_update_manifest(path, &mut manifest_value, &object_key, ctx, &scan_outcome);
        }
        return Ok(Outcome::Hit);
    }

    // Step 10: miss — run the real compiler.
    let object_tmp = store.path_for(&object_key, ".o").with_extension("o.tmp");
    if let Some(parent) = object_tmp.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let mut compile_args = Vec::new();
    compile_args.push("-c".to_string());
    compile_args.push("-o".to_string());
    compile_args.push(object_tmp.to_string_lossy().to_string());
    if ctx.config.run_second_cpp {
        compile_args.push(split.input_file.to_string_lossy().to_string());
    } else {
        compile_args.push("-".to_string());
    }
    compile_args.extend(split.common_args.iter().cloned());
    compile_args.extend(split.compiler_only_args.iter().cloned());

    let compile_output =
        exec::run_compiler(compiler, &compile_args, &ctx.cwd, &ctx.config.prefix_command)
            .map_err(|e| Error::Io { path: PathBuf::from(compiler), source: e })?;

    if !compile_output.stdout.is_empty() {
        stats.bump_global(Field::Stdout);
        let _ = std::io::stdout().write_all(&compile_output.stdout);
    }

    if !compile_output.status.success() {
        let _ = fs::remove_file(&object_tmp);
        let _ = std::io::stderr().write_all(&compile_output.stderr);
        stats.bump_global(Field::CompileFailed);
        return Err(fall_back(stats, compiler, raw_args));
    }

    let object_meta = fs::metadata(&object_tmp).ok();
    if object_meta.as_ref().map(|m| m.len()).unwrap_or(0) == 0 {
        let _ = fs::remove_file(&object_tmp);
        stats.bump_global(Field::EmptyOutput);
        return Err(fall_back(stats, compiler, raw_args));
    }

    // Step 11: store.
    let _ = std::io::stderr().write_all(&compile_output.stderr);
    store.ensure_shard(&object_key).map_err(|e| Error::Io { path: store.root().to_path_buf(), source: e })?;
    let installed_size = object_meta.map(|m| crate::shard::rounded_file_size(m.len())).unwrap_or(0);
    store
        .install_from_path(&object_key, ".o", &object_tmp)
        .map_err(|e| Error::Io { path: object_tmp.clone(), source: e })?;
    let _ = store.install_bytes(&object_key, ".stderr", &compile_output.stderr);

    if let Some(output_target) = &split.output_file {
        let final_target = absolute(ctx, output_target);
        let object_cache_path = store.path_for(&object_key, ".o");
        let _ = store.copy_out(&object_cache_path, &final_target, ctx.config.hard_link || ctx.config.file_clone);
    }

    stats.bump(&shard_id, Field::CacheMiss, 1);
    stats.bump(&shard_id, Field::CacheSizeKib, (installed_size / 1024) as i64);
    stats.bump(&shard_id, Field::FilesInCache, 1);

    if let Some(path) = &manifest_path {
        maybe_update_manifest(path, &mut manifest_value, &object_key, ctx, &scan_outcome);
    }

    if debug_enabled {
        if let Some(output) = &split.output_file {
            debug_log.record("stored new result");
            let _ = debug_log.flush(output);
        }
    }

    Ok(Outcome::Compiled(compile_output.status.code().unwrap_or(0)))
}

/// Record one result in the manifest at `path`, using the invocation's
/// accumulated include-file set (already merged with the current scan by
/// the caller inserting into `ctx.included_files`).
fn maybe_update_manifest(
    path: &Path,
    manifest_value: &mut Option<Manifest>,
    object_key: &Digest,
    ctx: &Context,
    _scan_outcome: &scanner::ScanOutcome,
) {
    let mut manifest = manifest_value.take().unwrap_or_default();
    let entries: Vec<IncludeEntry> = ctx.included_files.entries().to_vec();
    manifest.put(*object_key, &entries);
    let _ = manifest::store(path, &manifest);
}

fn matches_on_disk(ctx: &Context, entry: &IncludeEntry) -> bool {
    let path = if Path::new(&entry.path).is_absolute() {
        PathBuf::from(&entry.path)
    } else {
        ctx.cwd.join(&entry.path)
    };
    let Ok(meta) = fs::metadata(&path) else { return false };
    if meta.len() != entry.size {
        return false;
    }
    if ctx.config.sloppiness.file_stat_matches {
        return true;
    }
    let mut hasher = crate::digest::Hasher::new();
    if hasher.append_file(&path).is_err() {
        return false;
    }
    hasher.finalize() == entry.digest
}

/// Attempt to install a cached result family at `object_key`. Returns
/// `Ok(true)` on a full, consistent install; `Ok(false)` if the primary
/// `.o` artifact is absent (not a cached entry at all); deletes the whole
/// family and returns `Ok(false)` if any *other* required sibling is
/// unexpectedly missing after the `.o` was found.
fn install_from_cache(
    store: &ShardStore,
    object_key: &Digest,
    split: &SplitArgs,
    ctx: &Context,
) -> Result<bool> {
    match fs::metadata(store.path_for(object_key, ".o")) {
        Ok(m) if m.len() > 0 => {}
        _ => return Ok(false),
    }
    let object_path = store.path_for(object_key, ".o");

    let Some(output_target) = &split.output_file else { return Ok(false) };
    let final_target = absolute(ctx, output_target);
    let prefer_hardlink = ctx.config.hard_link;

    let installed = store
        .copy_out(&object_path, &final_target, prefer_hardlink)
        .map_err(|e| Error::Io { path: object_path.clone(), source: e })?;
    if !installed {
        return Ok(false);
    }

    let stderr_path = store.path_for(object_key, ".stderr");
    if let Ok(stderr_bytes) = fs::read(&stderr_path) {
        let _ = std::io::stderr().write_all(&stderr_bytes);
    }

    let _ = crate::shard::touch(&object_path);
    let _ = crate::shard::touch(&stderr_path);
    Ok(true)
}

fn absolute(ctx: &Context, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.cwd.join(path)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
