// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn config_error_maps_to_config_exit_code() {
    let err = Error::Config { message: "bad key".into(), path: None };
    assert_eq!(ExitCode::from(&err), ExitCode::ConfigError);
}

#[test]
fn io_error_maps_to_internal_exit_code() {
    let err = Error::Io {
        path: PathBuf::from("/tmp/x"),
        source: std::io::Error::other("boom"),
    };
    assert_eq!(ExitCode::from(&err), ExitCode::InternalError);
}

#[test]
fn compiler_not_found_maps_to_general_error() {
    let err = Error::CompilerNotFound("gcc".into());
    assert_eq!(ExitCode::from(&err), ExitCode::GeneralError);
}

#[test]
fn display_messages_are_human_readable() {
    let err = Error::MultipleSourceFiles;
    assert_eq!(err.to_string(), "multiple source files");
}
