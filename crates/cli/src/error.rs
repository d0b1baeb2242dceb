// SPDX-License-Identifier: MIT

use std::path::PathBuf;

/// ccwrap error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found or invalid.
    #[error("config error: {message}")]
    Config { message: String, path: Option<PathBuf> },

    /// Invalid or unsupported compiler command line.
    #[error("argument error: {0}")]
    Argument(String),

    /// File I/O error.
    #[error("io error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error (bug).
    #[error("internal error: {0}")]
    Internal(String),

    /// The real compiler could not be located (recursive-self-invocation or
    /// a broken `$PATH`).
    #[error("could not locate a real compiler named {0}")]
    CompilerNotFound(String),

    /// The preprocessor pass exited non-zero.
    #[error("preprocessor failed with exit status {0}")]
    PreprocessorFailed(i32),

    /// The real compile pass exited non-zero, produced no output, or
    /// produced unexpected stdout.
    #[error("compile failed: {0}")]
    CompileFailed(String),

    /// Compilation classified as link, not compile.
    #[error("called for link")]
    CalledForLink,

    /// No source/input file found on the command line.
    #[error("no input file")]
    NoInputFile,

    /// More than one source file on the command line.
    #[error("multiple source files")]
    MultipleSourceFiles,

    /// An option this crate cannot safely cache around.
    #[error("unsupported compiler option: {0}")]
    UnsupportedOption(String),

    /// Source language ccwrap does not know how to cache.
    #[error("unsupported source language: {0}")]
    UnsupportedSourceLanguage(String),

    /// An option makes the compilation fundamentally uncacheable.
    #[error("too hard to cache: {0}")]
    TooHardToCache(String),

    /// `-E` (preprocess-only) invocation: a cacheable-negative result, not
    /// a failure.
    #[error("preprocessing only (-E)")]
    PreprocessingOnly,

    /// Looks like an autoconf `conftest` probe compile.
    #[error("autoconf test")]
    AutoconfTest,

    /// A cache file that should exist (per the manifest or a prior step)
    /// is missing.
    #[error("missing cache file: {0}")]
    MissingCacheFile(String),
}

/// Result type using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success, or a cache hit/miss handled transparently.
    Success = 0,
    /// Administrative command failed (bad arguments, I/O error, …).
    GeneralError = 1,
    /// Configuration or argument error.
    ConfigError = 2,
    /// Internal error (bug).
    InternalError = 3,
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config { .. } => ExitCode::ConfigError,
            Error::Argument(_)
            | Error::CalledForLink
            | Error::NoInputFile
            | Error::MultipleSourceFiles
            | Error::UnsupportedOption(_)
            | Error::UnsupportedSourceLanguage(_)
            | Error::TooHardToCache(_)
            | Error::PreprocessingOnly
            | Error::AutoconfTest => ExitCode::ConfigError,
            Error::Io { .. } | Error::Internal(_) | Error::MissingCacheFile(_) => {
                ExitCode::InternalError
            }
            Error::CompilerNotFound(_) | Error::PreprocessorFailed(_) | Error::CompileFailed(_) => {
                ExitCode::GeneralError
            }
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
