// SPDX-License-Identifier: MIT

//! `ccache.conf`-style configuration: a flat key/value text format layered
//! with environment overrides.
//!
//! Grounded in `conf.hpp`/`confitems.hpp`/`envtoconfitems.hpp` from the
//! reference implementation: the full field enumeration, the case- and
//! separator-insensitive key matching, and the `CCACHE_<NAME>` environment
//! layering convention are all taken from there.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// How compiler identity is folded into the common hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerCheck {
    Mtime,
    Content,
    String(String),
    None,
    Command(String),
}

impl Default for CompilerCheck {
    fn default() -> Self {
        CompilerCheck::Mtime
    }
}

impl CompilerCheck {
    fn parse(value: &str) -> Self {
        if let Some(rest) = value.strip_prefix("string:") {
            CompilerCheck::String(rest.to_string())
        } else {
            match value {
                "mtime" => CompilerCheck::Mtime,
                "content" => CompilerCheck::Content,
                "none" => CompilerCheck::None,
                other => CompilerCheck::Command(other.to_string()),
            }
        }
    }
}

/// User-authorized relaxations trading strict correctness for more hits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sloppiness {
    pub file_stat_matches: bool,
    pub include_file_mtime: bool,
    pub include_file_ctime: bool,
    pub system_headers: bool,
    pub time_macros: bool,
    pub locale: bool,
    pub pch_defines: bool,
}

impl Sloppiness {
    fn parse(value: &str) -> Self {
        let mut s = Sloppiness::default();
        for token in value.split(|c: char| c == ',' || c.is_whitespace()) {
            match token.trim() {
                "file_stat_matches" => s.file_stat_matches = true,
                "include_file_mtime" => s.include_file_mtime = true,
                "include_file_ctime" => s.include_file_ctime = true,
                "system_headers" => s.system_headers = true,
                "time_macros" => s.time_macros = true,
                "locale" => s.locale = true,
                "pch_defines" => s.pch_defines = true,
                _ => {}
            }
        }
        s
    }
}

/// The full, immutable configuration consumed by every other component.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache_dir_levels: u32,
    pub compiler: Option<String>,
    pub compiler_check: CompilerCheck,
    pub compression: bool,
    pub compression_level: i32,
    pub cpp_extension: String,
    pub debug: bool,
    pub depend_mode: bool,
    pub direct_mode: bool,
    pub disable: bool,
    pub extra_files_to_hash: Vec<PathBuf>,
    pub file_clone: bool,
    pub hard_link: bool,
    pub hash_dir: bool,
    pub ignore_headers_in_manifest: Vec<PathBuf>,
    pub keep_comments_cpp: bool,
    pub limit_multiple: f64,
    pub log_file: Option<PathBuf>,
    pub max_files: u64,
    pub max_size: u64,
    pub path: Option<String>,
    pub pch_external_checksum: bool,
    pub prefix_command: Vec<String>,
    pub prefix_command_cpp: Vec<String>,
    pub read_only: bool,
    pub read_only_direct: bool,
    pub recache: bool,
    pub run_second_cpp: bool,
    pub sloppiness: Sloppiness,
    pub stats: bool,
    pub temporary_dir: Option<PathBuf>,
    pub umask: Option<u32>,
    pub unify: bool,
}

/// Default cache directory: `$XDG_CACHE_HOME/ccwrap` or platform equivalent,
/// via the same `directories` crate the `njsmith-posy` example uses for its
/// own cache-directory discovery.
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "ccwrap")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ccwrap-cache"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: None,
            cache_dir: default_cache_dir(),
            cache_dir_levels: crate::shard::SHARD_LEVELS as u32,
            compiler: None,
            compiler_check: CompilerCheck::default(),
            compression: true,
            compression_level: 0,
            cpp_extension: String::new(),
            debug: false,
            depend_mode: false,
            direct_mode: true,
            disable: false,
            extra_files_to_hash: Vec::new(),
            file_clone: false,
            hard_link: false,
            hash_dir: true,
            ignore_headers_in_manifest: Vec::new(),
            keep_comments_cpp: false,
            limit_multiple: crate::eviction::DEFAULT_LIMIT_MULTIPLE,
            log_file: None,
            max_files: 0,
            max_size: 5_000_000_000,
            path: None,
            pch_external_checksum: false,
            prefix_command: Vec::new(),
            prefix_command_cpp: Vec::new(),
            read_only: false,
            read_only_direct: false,
            recache: false,
            run_second_cpp: true,
            sloppiness: Sloppiness::default(),
            stats: true,
            temporary_dir: None,
            umask: None,
            unify: false,
        }
    }
}

/// Normalize a config key the way `confitems_get` does: lowercase, dashes
/// folded to underscores.
fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('-', "_")
}

/// Parse the flat `key = value` text format. Blank lines and `#`-comments
/// are ignored; malformed lines are skipped rather than treated as a hard
/// parse failure, since a single bad line in a hand-edited config shouldn't
/// make the whole cache unusable.
fn parse_text(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(normalize_key(key), value.trim().to_string());
        }
    }
    map
}

/// Read and parse one `ccache.conf`-style file.
pub fn read_config(path: &Path) -> Result<HashMap<String, String>, Error> {
    let text =
        std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(parse_text(&text))
}

/// Set (replacing or appending) one `key = value` line in a `ccache.conf`
/// file, for `-o`/`--set-config` and the `-F`/`-M` limit-setting flags.
/// Comments and unrelated lines are preserved verbatim.
pub fn set_config_key(path: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let normalized = normalize_key(key);
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut lines: Vec<String> = Vec::new();
    let mut replaced = false;

    for line in existing.lines() {
        let trimmed = line.trim();
        let is_match = !trimmed.is_empty()
            && !trimmed.starts_with('#')
            && trimmed.split_once('=').map(|(k, _)| normalize_key(k)) == Some(normalized.clone());
        if is_match {
            lines.push(format!("{normalized} = {value}"));
            replaced = true;
        } else {
            lines.push(line.to_string());
        }
    }
    if !replaced {
        lines.push(format!("{normalized} = {value}"));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, lines.join("\n") + "\n")
}

/// Render every known key as `key = value\n`, in struct field order, for
/// `-p`/`--show-config`.
pub fn render_config(config: &Config) -> String {
    let compiler_check = match &config.compiler_check {
        CompilerCheck::Mtime => "mtime".to_string(),
        CompilerCheck::Content => "content".to_string(),
        CompilerCheck::None => "none".to_string(),
        CompilerCheck::String(s) => format!("string:{s}"),
        CompilerCheck::Command(cmd) => cmd.clone(),
    };
    let sloppiness = {
        let s = &config.sloppiness;
        let mut parts = Vec::new();
        if s.file_stat_matches {
            parts.push("file_stat_matches");
        }
        if s.include_file_mtime {
            parts.push("include_file_mtime");
        }
        if s.include_file_ctime {
            parts.push("include_file_ctime");
        }
        if s.system_headers {
            parts.push("system_headers");
        }
        if s.time_macros {
            parts.push("time_macros");
        }
        if s.locale {
            parts.push("locale");
        }
        if s.pch_defines {
            parts.push("pch_defines");
        }
        parts.join(",")
    };

    let mut out = String::new();
    let mut line = |key: &str, value: String| out.push_str(&format!("{key} = {value}\n"));
    line("base_dir", config.base_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default());
    line("cache_dir", config.cache_dir.display().to_string());
    line("cache_dir_levels", config.cache_dir_levels.to_string());
    line("compiler", config.compiler.clone().unwrap_or_default());
    line("compiler_check", compiler_check);
    line("compression", config.compression.to_string());
    line("compression_level", config.compression_level.to_string());
    line("cpp_extension", config.cpp_extension.clone());
    line("debug", config.debug.to_string());
    line("depend_mode", config.depend_mode.to_string());
    line("direct_mode", config.direct_mode.to_string());
    line("disable", config.disable.to_string());
    line(
        "extra_files_to_hash",
        config.extra_files_to_hash.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(":"),
    );
    line("file_clone", config.file_clone.to_string());
    line("hard_link", config.hard_link.to_string());
    line("hash_dir", config.hash_dir.to_string());
    line(
        "ignore_headers_in_manifest",
        config
            .ignore_headers_in_manifest
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":"),
    );
    line("keep_comments_cpp", config.keep_comments_cpp.to_string());
    line("limit_multiple", config.limit_multiple.to_string());
    line("log_file", config.log_file.as_ref().map(|p| p.display().to_string()).unwrap_or_default());
    line("max_files", config.max_files.to_string());
    line("max_size", config.max_size.to_string());
    line("path", config.path.clone().unwrap_or_default());
    line("pch_external_checksum", config.pch_external_checksum.to_string());
    line("prefix_command", config.prefix_command.join(" "));
    line("prefix_command_cpp", config.prefix_command_cpp.join(" "));
    line("read_only", config.read_only.to_string());
    line("read_only_direct", config.read_only_direct.to_string());
    line("recache", config.recache.to_string());
    line("run_second_cpp", config.run_second_cpp.to_string());
    line("sloppiness", sloppiness);
    line("stats", config.stats.to_string());
    line("temporary_dir", config.temporary_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default());
    line("umask", config.umask.map(|u| format!("{u:03o}")).unwrap_or_default());
    line("unify", config.unify.to_string());
    out
}

/// Look up one key's effective value, for `-k`/`--get-config`.
pub fn get_config_value(config: &Config, key: &str) -> Option<String> {
    let map = parse_text(&render_config(config));
    map.get(&normalize_key(key)).cloned()
}

impl Config {
    fn apply_map(&mut self, map: &HashMap<String, String>) {
        let get = |k: &str| map.get(k).map(String::as_str);

        if let Some(v) = get("base_dir") {
            self.base_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("cache_dir") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("cache_dir_levels") {
            if let Ok(n) = v.parse() {
                self.cache_dir_levels = n;
            }
        }
        if let Some(v) = get("compiler") {
            self.compiler = Some(v.to_string());
        }
        if let Some(v) = get("compiler_check") {
            self.compiler_check = CompilerCheck::parse(v);
        }
        if let Some(v) = get("compression") {
            self.compression = parse_bool(v);
        }
        if let Some(v) = get("compression_level") {
            if let Ok(n) = v.parse() {
                self.compression_level = n;
            }
        }
        if let Some(v) = get("cpp_extension") {
            self.cpp_extension = v.to_string();
        }
        if let Some(v) = get("debug") {
            self.debug = parse_bool(v);
        }
        if let Some(v) = get("depend_mode") {
            self.depend_mode = parse_bool(v);
        }
        if let Some(v) = get("direct_mode") {
            self.direct_mode = parse_bool(v);
        }
        if let Some(v) = get("disable") {
            self.disable = parse_bool(v);
        }
        if let Some(v) = get("extra_files_to_hash") {
            self.extra_files_to_hash = split_paths(v);
        }
        if let Some(v) = get("file_clone") {
            self.file_clone = parse_bool(v);
        }
        if let Some(v) = get("hard_link") {
            self.hard_link = parse_bool(v);
        }
        if let Some(v) = get("hash_dir") {
            self.hash_dir = parse_bool(v);
        }
        if let Some(v) = get("ignore_headers_in_manifest") {
            self.ignore_headers_in_manifest = split_paths(v);
        }
        if let Some(v) = get("keep_comments_cpp") {
            self.keep_comments_cpp = parse_bool(v);
        }
        if let Some(v) = get("limit_multiple") {
            if let Ok(f) = v.parse() {
                self.limit_multiple = f;
            }
        }
        if let Some(v) = get("log_file") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("max_files") {
            if let Ok(n) = v.parse() {
                self.max_files = n;
            }
        }
        if let Some(v) = get("max_size") {
            if let Some(n) = parse_size(v) {
                self.max_size = n;
            }
        }
        if let Some(v) = get("path") {
            self.path = Some(v.to_string());
        }
        if let Some(v) = get("pch_external_checksum") {
            self.pch_external_checksum = parse_bool(v);
        }
        if let Some(v) = get("prefix_command") {
            self.prefix_command = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("prefix_command_cpp") {
            self.prefix_command_cpp = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("read_only") {
            self.read_only = parse_bool(v);
        }
        if let Some(v) = get("read_only_direct") {
            self.read_only_direct = parse_bool(v);
        }
        if let Some(v) = get("recache") {
            self.recache = parse_bool(v);
        }
        if let Some(v) = get("run_second_cpp") {
            self.run_second_cpp = parse_bool(v);
        }
        if let Some(v) = get("sloppiness") {
            self.sloppiness = Sloppiness::parse(v);
        }
        if let Some(v) = get("stats") {
            self.stats = parse_bool(v);
        }
        if let Some(v) = get("temporary_dir") {
            self.temporary_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("umask") {
            self.umask = u32::from_str_radix(v, 8).ok();
        }
        if let Some(v) = get("unify") {
            self.unify = parse_bool(v);
        }
    }

    /// Environment variable layer: `CCACHE_<NAME>` for every field (the
    /// `envtoconfitems` table), plus a handful of legacy-named variables.
    fn apply_env(&mut self) {
        let fields = [
            "base_dir", "cache_dir", "cache_dir_levels", "compiler", "compiler_check",
            "compression", "compression_level", "cpp_extension", "debug", "depend_mode",
            "direct_mode", "disable", "extra_files_to_hash", "file_clone", "hard_link",
            "hash_dir", "ignore_headers_in_manifest", "keep_comments_cpp", "limit_multiple",
            "log_file", "max_files", "max_size", "path", "pch_external_checksum",
            "prefix_command", "prefix_command_cpp", "read_only", "read_only_direct", "recache",
            "run_second_cpp", "sloppiness", "stats", "temporary_dir", "umask", "unify",
        ];
        let mut map = HashMap::new();
        for field in fields {
            let var = format!("CCACHE_{}", field.to_uppercase());
            if let Ok(value) = std::env::var(var) {
                map.insert(field.to_string(), value);
            }
        }
        self.apply_map(&map);

        // Legacy-named variables that don't follow the direct CCACHE_<NAME>
        // pattern, or that invert a boolean's sense.
        if std::env::var_os("CCACHE_NOSTATS").is_some() {
            self.stats = false;
        }
        if std::env::var_os("CCACHE_DISABLE").is_some() {
            self.disable = true;
        }
        if std::env::var_os("CCACHE_RECACHE").is_some() {
            self.recache = true;
        }
        if std::env::var_os("CCACHE_READONLY").is_some() {
            self.read_only = true;
        }
        if let Ok(v) = std::env::var("CCACHE_BASEDIR") {
            self.base_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("CCACHE_PREFIX") {
            self.prefix_command = v.split_whitespace().map(str::to_string).collect();
        }
        // The reference tool's actual cache-directory variable is
        // `CCACHE_DIR`, not the generic `CCACHE_CACHE_DIR` the field-name
        // loop above would produce.
        if let Ok(v) = std::env::var("CCACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
    }

    /// Layer compiled-in defaults, an optional system config, the cache
    /// directory's own config, an optional `CCACHE_CONFIGPATH` override, and
    /// finally environment variables, in increasing priority.
    pub fn load(system_config: Option<&Path>, configpath_override: Option<&Path>) -> Result<Config, Error> {
        let mut config = Config::default();

        if let Some(path) = system_config {
            if path.exists() {
                let map = read_config(path)?;
                config.apply_map(&map);
            }
        }

        let cache_config = config.cache_dir.join("ccache.conf");
        if cache_config.exists() {
            let map = read_config(&cache_config)?;
            config.apply_map(&map);
        }

        if let Some(path) = configpath_override {
            let map = read_config(path)?;
            config.apply_map(&map);
        }

        config.apply_env();
        Ok(config)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Parse a size value with an optional `K`/`M`/`G`/`T` suffix (binary-ish,
/// matching the reference's own suffix handling), falling back to bare bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1000),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1000 * 1000),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1000 * 1000 * 1000),
        Some('T') | Some('t') => (&value[..value.len() - 1], 1000u64 * 1000 * 1000 * 1000),
        _ => (value, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
