// SPDX-License-Identifier: MIT

//! CLI argument parsing with clap derive.
//!
//! Only covers the *administrative* invocation shape (`ccwrap -s`, `ccwrap
//! --show-stats`, ...). The wrapper invocation shape (`ccwrap cc -c foo.c`,
//! or symlink invocation as `cc`) is detected and dispatched *before*
//! `clap::Parser::parse` is ever reached — see [`crate::main`] — because
//! compiler argument syntax is not CLI syntax clap can parse.

use std::path::PathBuf;

use clap::Parser;

/// A transparent compiler cache for C/C++/Objective-C/CUDA/assembler builds.
#[derive(Parser, Debug)]
#[command(name = "ccwrap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show cache statistics.
    #[arg(short = 's', long = "show-stats")]
    pub show_stats: bool,

    /// Show statistics in machine-parseable `key\tvalue` form.
    #[arg(long = "print-stats")]
    pub print_stats: bool,

    /// Zero cache statistics (does not affect files-in-cache/cache-size).
    #[arg(short = 'z', long = "zero-stats")]
    pub zero_stats: bool,

    /// Show the effective configuration.
    #[arg(short = 'p', long = "show-config")]
    pub show_config: bool,

    /// Print the value of one configuration key.
    #[arg(short = 'k', long = "get-config", value_name = "KEY")]
    pub get_config: Option<String>,

    /// Set one configuration key to a value (`key=value` or two arguments).
    #[arg(short = 'o', long = "set-config", value_name = "KEY=VALUE")]
    pub set_config: Option<String>,

    /// Run a cleanup pass (evict down to the configured size/file limits).
    #[arg(short = 'c', long = "cleanup")]
    pub cleanup: bool,

    /// Clear the entire cache.
    #[arg(short = 'C', long = "clear")]
    pub clear: bool,

    /// Set the maximum number of files and run a cleanup pass.
    #[arg(short = 'F', long = "max-files", value_name = "N")]
    pub max_files: Option<u64>,

    /// Set the maximum cache size (accepts `K`/`M`/`G`/`T` suffixes) and run
    /// a cleanup pass.
    #[arg(short = 'M', long = "max-size", value_name = "SIZE")]
    pub max_size: Option<String>,

    /// Dump a manifest file's contents as text, for debugging.
    #[arg(long = "dump-manifest", value_name = "PATH")]
    pub dump_manifest: Option<PathBuf>,

    /// Print the direct-mode hash that would be computed for a source file.
    #[arg(long = "hash-file", value_name = "PATH")]
    pub hash_file: Option<PathBuf>,

    /// Use a specific config file instead of `<cache_dir>/ccache.conf`.
    #[arg(long = "config-file", env = "CCACHE_CONFIGPATH", value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
