// SPDX-License-Identifier: MIT

//! `ccwrap` entry point: invocation-mode detection, then dispatch to either
//! the compiler-cache orchestrator or an administrative command.
//!
//! Three invocation shapes share this one binary (see SPEC_FULL.md §4.L):
//!
//! - **Symlink mode**: invoked as `cc`, `gcc`, `clang++`, etc. — `argv[0]`'s
//!   basename names the real compiler, every other argument is compiler
//!   arguments.
//! - **Prefix mode**: invoked as `ccwrap <real-compiler> <args...>`.
//! - **Administrative mode**: invoked as `ccwrap -s`, `ccwrap --show-config`,
//!   etc. — parsed by [`clap`] via [`ccwrap::cli::Cli`].
//!
//! Compiler argument syntax is not something `clap` can parse (it has its
//! own `-I`/`-D`/`-o foo`/`-ofoo` conventions), so the first two shapes are
//! detected and dispatched *before* `Cli::parse` is ever reached.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use ccwrap::cli::Cli;
use ccwrap::config::Config;
use ccwrap::context::Context;
use ccwrap::error::{Error, ExitCode};
use ccwrap::orchestrator::{self, Outcome};
use ccwrap::shard::ShardStore;
use ccwrap::stats::Counters;
use ccwrap::{config, digest, eviction, manifest, report, stats};

fn init_logging() {
    let filter = EnvFilter::try_from_env("CCWRAP_LOG").unwrap_or_else(|_| EnvFilter::new("off"));

    fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let argv0 = args.first().cloned().unwrap_or_default();
    let basename =
        Path::new(&argv0).file_name().and_then(|n| n.to_str()).unwrap_or(argv0.as_str()).to_string();
    let rest = &args[1..];

    let exit_code = if basename != "ccwrap" {
        run_compile(&argv0, rest)
    } else {
        match rest.first() {
            Some(first) if !first.starts_with('-') => run_compile(first, &rest[1..]),
            _ => run_admin(rest),
        }
    };

    std::process::exit(exit_code);
}

/// Load configuration the same way for every invocation shape: an optional
/// `CCACHE_CONFIGPATH`-named file (or an explicit override in admin mode)
/// layered over the cache directory's own `ccache.conf`, topped with
/// environment variables.
fn load_config(configpath_override: Option<&Path>) -> Result<Config, Error> {
    let env_configpath = std::env::var("CCACHE_CONFIGPATH").ok().map(PathBuf::from);
    let override_path = configpath_override.map(Path::to_path_buf).or(env_configpath);
    Config::load(None, override_path.as_deref())
}

fn run_compile(argv0: &str, raw_args: &[String]) -> i32 {
    let config = match load_config(None) {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };
    let cwd = match std::env::current_dir() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ccwrap: could not determine current directory: {e}");
            return ExitCode::InternalError as i32;
        }
    };
    let mut ctx = Context::new(config, cwd);

    match orchestrator::run(&mut ctx, argv0, raw_args) {
        Ok(Outcome::Hit) => 0,
        Ok(Outcome::Compiled(code)) => code,
        Err(e) => report_error(&e),
    }
}

fn report_error(err: &Error) -> i32 {
    eprintln!("ccwrap: {err}");
    ExitCode::from(err) as i32
}

fn run_admin(rest: &[String]) -> i32 {
    let cli = Cli::try_parse_from(std::iter::once("ccwrap".to_string()).chain(rest.iter().cloned()))
        .unwrap_or_else(|e| e.exit());

    let config = match load_config(cli.config_file.as_deref()) {
        Ok(c) => c,
        Err(e) => return report_error(&e),
    };
    let store = ShardStore::new(config.cache_dir.clone());
    let config_path = config.cache_dir.join("ccache.conf");

    if cli.zero_stats {
        zero_all_shards(&store);
    }

    if let Some(kv) = &cli.set_config {
        match kv.split_once('=') {
            Some((key, value)) => {
                if let Err(e) = config::set_config_key(&config_path, key, value) {
                    eprintln!("ccwrap: could not write {}: {e}", config_path.display());
                    return ExitCode::InternalError as i32;
                }
            }
            None => {
                eprintln!("ccwrap: --set-config requires KEY=VALUE, got {kv:?}");
                return ExitCode::ConfigError as i32;
            }
        }
    }

    let mut effective_max_files = config.max_files;
    let mut effective_max_size = config.max_size;
    let mut run_cleanup = cli.cleanup;

    if let Some(n) = cli.max_files {
        if let Err(e) = config::set_config_key(&config_path, "max_files", &n.to_string()) {
            eprintln!("ccwrap: could not write {}: {e}", config_path.display());
            return ExitCode::InternalError as i32;
        }
        effective_max_files = n;
        run_cleanup = true;
    }

    if let Some(size_text) = &cli.max_size {
        if let Err(e) = config::set_config_key(&config_path, "max_size", size_text) {
            eprintln!("ccwrap: could not write {}: {e}", config_path.display());
            return ExitCode::InternalError as i32;
        }
        match config::parse_size(size_text) {
            Some(n) => effective_max_size = n,
            None => {
                eprintln!("ccwrap: invalid size {size_text:?}");
                return ExitCode::ConfigError as i32;
            }
        }
        run_cleanup = true;
    }

    if cli.clear {
        if let Err(e) = clear_cache(&store) {
            eprintln!("ccwrap: could not clear cache: {e}");
            return ExitCode::InternalError as i32;
        }
    } else if run_cleanup {
        let results =
            eviction::evict_all(&store, effective_max_files, effective_max_size, config.limit_multiple);
        for (shard_id, result) in &results {
            if let Err(e) = result {
                tracing::warn!(shard = %shard_id, error = %e, "cleanup failed for shard");
            }
        }
    }

    if cli.show_config {
        print!("{}", config::render_config(&config));
    }

    if let Some(key) = &cli.get_config {
        match config::get_config_value(&config, key) {
            Some(value) => println!("{value}"),
            None => {
                eprintln!("ccwrap: unknown configuration key {key:?}");
                return ExitCode::ConfigError as i32;
            }
        }
    }

    if let Some(path) = &cli.dump_manifest {
        if let Err(code) = dump_manifest(path) {
            return code;
        }
    }

    if let Some(path) = &cli.hash_file {
        match digest::hash_file(path) {
            Ok(digest) => println!("{digest}"),
            Err(e) => {
                eprintln!("ccwrap: {}: {e}", path.display());
                return ExitCode::InternalError as i32;
            }
        }
    }

    if cli.show_stats {
        let counters = aggregate_stats(&store);
        print!("{}", report::render_stats(&counters, &config));
    }

    if cli.print_stats {
        let counters = aggregate_stats(&store);
        print!("{}", report::render_stats_machine(&counters));
    }

    ExitCode::Success as i32
}

/// Sum every shard's counters field-by-field into a whole-cache total. Even
/// the "absolute" fields (files-in-cache, cache-size) are additive here:
/// each shard tracks its own slice of the cache, so the whole-cache total is
/// their sum, not any one shard's value.
fn aggregate_stats(store: &ShardStore) -> Counters {
    let mut total = Counters::new();
    for shard_id in store.all_shard_ids() {
        let shard = stats::read(&store.stats_path_for_id(&shard_id));
        for field in report::all_fields() {
            total.increment(field, shard.get(field) as i64);
        }
    }
    total
}

fn zero_all_shards(store: &ShardStore) {
    let now = manifest::now_seconds().max(0) as u64;
    for shard_id in store.all_shard_ids() {
        let path = store.stats_path_for_id(&shard_id);
        let mut counters = stats::read(&path);
        stats::zero(&mut counters, now);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, counters.to_text());
    }
}

fn clear_cache(store: &ShardStore) -> std::io::Result<()> {
    if store.root().exists() {
        std::fs::remove_dir_all(store.root())?;
    }
    std::fs::create_dir_all(store.root())
}

fn dump_manifest(path: &Path) -> Result<(), i32> {
    let Some(manifest) = manifest::load(path) else {
        eprintln!("ccwrap: {}: not a manifest file", path.display());
        return Err(ExitCode::GeneralError as i32);
    };

    println!("paths: {}", manifest.paths.len());
    for (i, p) in manifest.paths.iter().enumerate() {
        println!("  [{i}] {p}");
    }
    println!("file_infos: {}", manifest.file_infos.len());
    for (i, fi) in manifest.file_infos.iter().enumerate() {
        println!(
            "  [{i}] {} size={} mtime={} ctime={} digest={}",
            fi.path, fi.size, fi.mtime, fi.ctime, fi.digest
        );
    }
    println!("results: {}", manifest.results.len());
    for (i, r) in manifest.results.iter().enumerate() {
        println!("  [{i}] key={} includes={:?}", r.object_key, r.file_info_indexes);
    }
    Ok(())
}
