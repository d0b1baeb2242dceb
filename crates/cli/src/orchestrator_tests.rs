// SPDX-License-Identifier: MIT

use super::*;
use crate::config::Config;
use std::os::unix::fs::PermissionsExt;

/// Write a fake "compiler" shell script: `-E` prints fixed preprocessed
/// text to stdout, `-c -o <path>` writes a few deterministic bytes to
/// `<path>`. Good enough to drive the orchestrator's state machine without
/// a real C toolchain.
fn write_fake_compiler(dir: &Path) -> PathBuf {
    let path = dir.join("fake-cc");
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
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn base_config(cache_dir: PathBuf, compiler: PathBuf) -> Config {
    let mut config = Config::default();
    config.cache_dir = cache_dir;
    config.compiler = Some(compiler.to_string_lossy().to_string());
    config
}

#[test]
fn miss_then_hit_round_trip() {
    let workdir = tempfile::tempdir().unwrap();
    let cache_dir = workdir.path().join("cache");
    let compiler = write_fake_compiler(workdir.path());
    let source = workdir.path().join("a.c");
    fs::write(&source, "int main(void) { return 0; }\n").unwrap();

    let raw_args: Vec<String> =
        vec!["-c".into(), "a.c".into(), "-o".into(), "a.o".into()];

    let config = base_config(cache_dir.clone(), compiler.clone());
    let mut ctx = Context::new(config.clone(), workdir.path().to_path_buf());
    let outcome = run(&mut ctx, "fake-cc", &raw_args).unwrap();
    assert!(matches!(outcome, Outcome::Compiled(0)));
    assert!(workdir.path().join("a.o").exists());
    fs::remove_file(workdir.path().join("a.o")).unwrap();

    let mut ctx2 = Context::new(config, workdir.path().to_path_buf());
    let outcome2 = run(&mut ctx2, "fake-cc", &raw_args).unwrap();
    assert_eq!(outcome2, Outcome::Hit);
    assert!(workdir.path().join("a.o").exists());
    let installed = fs::read(workdir.path().join("a.o")).unwrap();
    assert_eq!(installed, b"OBJ");
}

#[test]
fn disabled_config_falls_back_and_reports_error_on_exec_failure() {
    let workdir = tempfile::tempdir().unwrap();
    let cache_dir = workdir.path().join("cache");
    // A file that exists but is not executable: find_compiler resolves it,
    // but exec::fallback's underlying exec() call fails with EACCES,
    // surfacing as an error rather than replacing the test process.
    let compiler = workdir.path().join("not-executable");
    fs::write(&compiler, "not a real compiler").unwrap();

    let mut config = base_config(cache_dir, compiler);
    config.disable = true;
    let mut ctx = Context::new(config, workdir.path().to_path_buf());

    let raw_args: Vec<String> = vec!["-c".into(), "a.c".into()];
    let err = run(&mut ctx, "fake-cc", &raw_args).unwrap_err();
    assert!(matches!(err, Error::CompilerNotFound(_)));
}

#[test]
fn find_compiler_rejects_missing_explicit_path() {
    let workdir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.compiler = Some(workdir.path().join("does-not-exist").to_string_lossy().to_string());
    let ctx = Context::new(config, workdir.path().to_path_buf());
    let err = find_compiler(&ctx, "fake-cc").unwrap_err();
    assert!(matches!(err, Error::CompilerNotFound(_)));
}

#[test]
fn find_compiler_resolves_explicit_absolute_path() {
    let workdir = tempfile::tempdir().unwrap();
    let compiler = write_fake_compiler(workdir.path());
    let config = base_config(workdir.path().join("cache"), compiler.clone());
    let ctx = Context::new(config, workdir.path().to_path_buf());
    let resolved = find_compiler(&ctx, "fake-cc").unwrap();
    assert_eq!(resolved, compiler);
}

#[test]
fn field_for_split_error_covers_classification_errors() {
    assert_eq!(field_for_split_error(&Error::CalledForLink), Field::CalledForLink);
    assert_eq!(field_for_split_error(&Error::NoInputFile), Field::NoInputFile);
    assert_eq!(field_for_split_error(&Error::MultipleSourceFiles), Field::MultipleSourceFiles);
    assert_eq!(field_for_split_error(&Error::AutoconfTest), Field::AutoconfTest);
    assert_eq!(
        field_for_split_error(&Error::UnsupportedOption("-fsyntax-only".into())),
        Field::UnsupportedOption
    );
    assert_eq!(field_for_split_error(&Error::PreprocessingOnly), Field::Preprocessing);
    assert_eq!(
        field_for_split_error(&Error::TooHardToCache("-MJ".into())),
        Field::UnsupportedDirective
    );
    assert_eq!(
        field_for_split_error(&Error::Io { path: PathBuf::from("x"), source: std::io::Error::other("boom") }),
        Field::InternalError
    );
    assert_eq!(field_for_split_error(&Error::Argument("bad".into())), Field::BadCompilerArguments);
}

#[test]
fn strip_internal_flags_drops_ccache_prefixed_args() {
    let args: Vec<String> =
        vec!["--ccache-skip".into(), "-c".into(), "a.c".into()];
    let stripped = strip_internal_flags(&args);
    assert_eq!(stripped, vec!["-c".to_string(), "a.c".to_string()]);
}
