// SPDX-License-Identifier: MIT

//! Process spawning: running the preprocessor, running the real compiler,
//! and the terminal fallback that replaces this process with the real
//! compiler entirely.

use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Run the preprocessor (`compiler -E [-C] <common+cpp args> input`),
/// capturing stdout and stderr separately rather than streaming them.
pub fn run_preprocessor(
    compiler: &str,
    args: &[String],
    cwd: &Path,
    prefix_command: &[String],
) -> std::io::Result<Output> {
    build_command(compiler, args, cwd, prefix_command).output()
}

/// Run the real compiler to produce the object file (or whatever the
/// original invocation asked for on a miss), capturing stdout/stderr.
pub fn run_compiler(
    compiler: &str,
    args: &[String],
    cwd: &Path,
    prefix_command: &[String],
) -> std::io::Result<Output> {
    build_command(compiler, args, cwd, prefix_command).output()
}

fn build_command(compiler: &str, args: &[String], cwd: &Path, prefix_command: &[String]) -> Command {
    let (program, prefix_args) = match prefix_command.split_first() {
        Some((first, rest)) => (first.as_str(), rest),
        None => (compiler, &[][..]),
    };

    let mut cmd = Command::new(program);
    cmd.current_dir(cwd);
    cmd.stdin(Stdio::null());

    if !prefix_command.is_empty() {
        cmd.args(prefix_args);
        cmd.arg(compiler);
    }
    cmd.args(args);
    cmd
}

/// Terminal fallback: replace this process's image with the real compiler,
/// running the user's original argument vector. On Unix this is a true
/// `exec` (no wait/exit-code translation needed, no window for us to be
/// killed between child exit and our own exit). On other platforms, spawn,
/// wait, and exit with the child's status.
pub fn fallback(compiler: &str, args: &[String]) -> std::io::Result<std::convert::Infallible> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = Command::new(compiler).args(args).exec();
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let status = Command::new(compiler).args(args).status()?;
        std::process::exit(status.code().unwrap_or(1));
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
