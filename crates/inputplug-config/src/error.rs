use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(inputplug::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(inputplug::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(inputplug::config::missing_field))]
    MissingField { field: String },

    #[error("Command {path} does not exist")]
    #[diagnostic(
        code(inputplug::config::command_not_found),
        help("pass an existing executable with --command")
    )]
    CommandNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    #[diagnostic(code(inputplug::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
