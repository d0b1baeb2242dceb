// SPDX-License-Identifier: MIT

//! Compiler command-line parsing, classification, and splitting into the
//! derived argument vectors the two hashing strategies need.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Options that make a compilation fundamentally too hard to cache safely.
const TOO_HARD_OPTIONS: &[&str] = &["-Wp,-P", "-fdump-", "-Xarch_", "-MJ"];

/// Options ccwrap understands but refuses to cache around (a narrower,
/// explicitly-named set distinct from "too hard").
const UNSUPPORTED_OPTIONS: &[&str] = &["-fsyntax-only"];

/// Flags recorded from the command line beyond the three argument vectors.
#[derive(Debug, Default, Clone)]
pub struct InvocationFlags {
    pub producing_object: bool,
    pub separable_device_compile: bool,
    pub assembly_only: bool,
    pub generating_pch: bool,
    pub using_pch: bool,
    pub profile_generate: bool,
    pub profile_use: bool,
    pub coverage: bool,
    pub stack_usage: bool,
    pub split_dwarf: bool,
    pub clang_diagnostics: bool,
    pub saw_prefix_map: bool,
}

/// The result of successfully splitting a compiler command line.
#[derive(Debug, Clone)]
pub struct SplitArgs {
    pub compiler: String,
    pub input_file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub common_args: Vec<String>,
    pub cpp_args: Vec<String>,
    pub compiler_only_args: Vec<String>,
    pub dependency_args: Vec<String>,
    pub flags: InvocationFlags,
}

fn is_path_option(arg: &str) -> bool {
    arg.starts_with("-I")
        || arg.starts_with("-isystem")
        || arg.starts_with("-iquote")
        || arg.starts_with("-include")
        || arg.starts_with("--sysroot=")
}

fn is_prefix_map_option(arg: &str) -> bool {
    arg.starts_with("-fdebug-prefix-map=")
        || arg.starts_with("-ffile-prefix-map=")
        || arg.starts_with("-fmacro-prefix-map=")
}

/// Rewrite a path-bearing argument's path portion to be relative to `cwd`
/// when it falls under `base_dir`.
fn relativize_arg(arg: &str, base_dir: Option<&Path>, cwd: &Path) -> String {
    let Some(base) = base_dir else { return arg.to_string() };

    let (prefix, path_part) = match arg.split_once(|c: char| c == '=') {
        Some((p, v)) if arg.starts_with("--sysroot=") => (format!("{p}="), v),
        _ => {
            if let Some(rest) = arg.strip_prefix("-I") {
                ("-I".to_string(), rest)
            } else if let Some(rest) = arg.strip_prefix("-isystem") {
                ("-isystem".to_string(), rest.trim_start())
            } else if let Some(rest) = arg.strip_prefix("-iquote") {
                ("-iquote".to_string(), rest.trim_start())
            } else if let Some(rest) = arg.strip_prefix("-include") {
                ("-include".to_string(), rest.trim_start())
            } else {
                return arg.to_string();
            }
        }
    };

    let path = Path::new(path_part);
    if let Ok(rel) = path.strip_prefix(base) {
        if let Ok(relative_base) = cwd.strip_prefix(base) {
            let ups = relative_base.components().count();
            let mut out = PathBuf::new();
            for _ in 0..ups {
                out.push("..");
            }
            return format!("{prefix}{}", out.join(rel).display());
        }
    }
    arg.to_string()
}

/// Expand `@file`/`-optf`/`--options-file` argument files with shell-like
/// quoting (double, single, backslash escapes; unquoted whitespace
/// separates tokens).
pub fn expand_argument_files(args: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some(path) = arg.strip_prefix('@') {
            out.extend(expand_one_file(path)?);
        } else if arg == "-optf" || arg == "--options-file" {
            let path = args.get(i + 1).ok_or_else(|| {
                Error::Argument(format!("{arg} requires a following path argument"))
            })?;
            out.extend(expand_one_file(path)?);
            i += 1;
        } else {
            out.push(arg.clone());
        }
        i += 1;
    }
    Ok(out)
}

fn expand_one_file(path: &str) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| Error::Io { path: PathBuf::from(path), source })?;
    Ok(tokenize_shell_like(&text))
}

fn tokenize_shell_like(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('\'') => current.push(c),
            Some('"') => {
                if c == '\\' {
                    if let Some(&next) = chars.peek() {
                        if next == '"' || next == '\\' {
                            current.push(next);
                            chars.next();
                            continue;
                        }
                    }
                    current.push(c);
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    in_token = true;
                } else if c == '\\' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_token = true;
                    }
                } else if c.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else {
                    current.push(c);
                    in_token = true;
                }
            }
            Some(_) => unreachable!(),
        }
        if quote.is_some() {
            in_token = true;
        }
    }
    if in_token || !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_clang(compiler: &str) -> bool {
    let base = Path::new(compiler).file_name().and_then(|n| n.to_str()).unwrap_or(compiler);
    base.contains("clang")
}

/// Split one compiler command line into the three derived argument vectors
/// plus invocation flags, or a classified [`Error`] the orchestrator can
/// turn into a statistics increment plus fallback.
pub fn split(
    compiler: &str,
    raw_args: &[String],
    base_dir: Option<&Path>,
    cwd: &Path,
) -> Result<SplitArgs> {
    let expanded = expand_argument_files(raw_args)?;
    let clang = is_clang(compiler);

    let mut common_args = Vec::new();
    let mut cpp_args = Vec::new();
    let mut compiler_only_args = Vec::new();
    let mut dependency_args = Vec::new();
    let mut flags = InvocationFlags::default();
    let mut input_file: Option<PathBuf> = None;
    let mut output_file: Option<PathBuf> = None;
    let mut source_count = 0usize;
    let mut saw_link_flag = false;

    let mut i = 0;
    while i < expanded.len() {
        let arg = expanded[i].as_str();

        if arg == "--ccache-skip" {
            i += 1;
            if let Some(next) = expanded.get(i) {
                common_args.push(next.clone());
            }
            i += 1;
            continue;
        }

        if TOO_HARD_OPTIONS.iter().any(|opt| arg.starts_with(opt)) {
            return Err(Error::TooHardToCache(arg.to_string()));
        }
        if UNSUPPORTED_OPTIONS.contains(&arg) {
            return Err(Error::UnsupportedOption(arg.to_string()));
        }

        match arg {
            "-c" => {
                flags.producing_object = true;
                i += 1;
                continue;
            }
            "-dc" => {
                flags.separable_device_compile = true;
                i += 1;
                continue;
            }
            "-S" => {
                flags.assembly_only = true;
                i += 1;
                continue;
            }
            "-E" => return Err(Error::PreprocessingOnly),
            "-o" => {
                if let Some(next) = expanded.get(i + 1) {
                    output_file = Some(PathBuf::from(next));
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        if let Some(rest) = arg.strip_prefix("-o") {
            if !rest.is_empty() {
                output_file = Some(PathBuf::from(rest));
                i += 1;
                continue;
            }
        }
        if arg == "-x" || arg.starts_with("-x") {
            // Language override, kept as a common arg.
        }
        if arg.starts_with("-fprofile-generate") {
            flags.profile_generate = true;
        }
        if arg.starts_with("-fprofile-use") {
            flags.profile_use = true;
        }
        if arg.contains("--coverage") || arg.starts_with("-fprofile-arcs") {
            flags.coverage = true;
        }
        if arg.starts_with("-fstack-usage") {
            flags.stack_usage = true;
        }
        if arg.starts_with("-gsplit-dwarf") {
            flags.split_dwarf = true;
        }
        if arg.starts_with("--serialize-diagnostics") {
            flags.clang_diagnostics = true;
        }
        if arg.ends_with(".gch") || arg.ends_with(".pch") {
            flags.generating_pch = output_file.as_deref().map(|p| p.extension().is_some()).unwrap_or(false);
        }

        if arg == "-MF" || arg == "-MQ" || arg == "-MT" {
            dependency_args.push(arg.to_string());
            if let Some(next) = expanded.get(i + 1) {
                dependency_args.push(next.clone());
            }
            i += 2;
            continue;
        }
        if let Some(rest) = arg.strip_prefix("-Wp,") {
            if rest.starts_with("-MD,") || rest.starts_with("-MMD,") {
                dependency_args.push(arg.to_string());
                i += 1;
                continue;
            }
        }

        if !arg.starts_with('-') {
            let path = Path::new(arg);
            let is_source = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("c" | "cc" | "cpp" | "cxx" | "c++" | "m" | "mm" | "cu" | "s" | "S")
            );
            if is_source {
                source_count += 1;
                if input_file.is_none() {
                    input_file = Some(path.to_path_buf());
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("o") {
                saw_link_flag = true;
            }
            common_args.push(relativize_arg(arg, base_dir, cwd));
            i += 1;
            continue;
        }

        if is_prefix_map_option(arg) {
            flags.saw_prefix_map = true;
            common_args.push(arg.split_once('=').map(|(p, _)| format!("{p}=")).unwrap_or_default());
            i += 1;
            continue;
        }

        let rewritten = relativize_arg(arg, base_dir, cwd);

        if is_path_option(arg) {
            cpp_args.push(rewritten);
            i += 1;
            continue;
        }

        if (arg.starts_with("-L") || arg.starts_with("-Wl,")) && !clang {
            // Link-only, excluded from the compile hash entirely.
            i += 1;
            continue;
        }

        if arg.starts_with("-O") || arg.starts_with("-W") || arg.starts_with('-g') || arg.starts_with("-m") {
            compiler_only_args.push(rewritten);
        } else {
            common_args.push(rewritten);
        }
        i += 1;
    }

    if saw_link_flag && !flags.producing_object && !flags.assembly_only {
        return Err(Error::CalledForLink);
    }
    if source_count > 1 {
        return Err(Error::MultipleSourceFiles);
    }
    let Some(input_file) = input_file else { return Err(Error::NoInputFile) };

    if is_autoconf_probe(&input_file) {
        return Err(Error::AutoconfTest);
    }

    // No explicit `-o`: the real compiler still writes an output file,
    // named from the source's stem and placed in the current directory
    // (not the source's own directory), so the cache must derive and use
    // the same default or the compiled object is never written back.
    if output_file.is_none() {
        let stem = input_file.file_stem().and_then(|s| s.to_str()).unwrap_or("a");
        if flags.assembly_only {
            output_file = Some(PathBuf::from(format!("{stem}.s")));
        } else if flags.producing_object {
            output_file = Some(PathBuf::from(format!("{stem}.o")));
        }
    }

    Ok(SplitArgs {
        compiler: compiler.to_string(),
        input_file,
        output_file,
        common_args,
        cpp_args,
        compiler_only_args,
        dependency_args,
        flags,
    })
}

fn is_autoconf_probe(input_file: &Path) -> bool {
    input_file.file_stem().and_then(|s| s.to_str()).map(|s| s.starts_with("conftest")).unwrap_or(false)
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
