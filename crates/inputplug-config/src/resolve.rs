//! Merging of file, environment and command-line settings
//!
//! Precedence, per field: command line, then environment (announce address
//! only), then configuration file, then built-in default.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::model::*;

/// Merge `config` with command-line `overrides` and validate the result
///
/// `env_address` is the value of the announce address environment variable,
/// if set.
///
/// # Errors
///
/// Returns `ConfigError::MissingField` when no command is configured and
/// `ConfigError::CommandNotFound` when the command path does not resolve to
/// an existing file.
pub fn resolve(
    config: Config,
    overrides: Overrides,
    env_address: Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let command = overrides
        .command
        .or(config.command)
        .ok_or_else(|| ConfigError::MissingField {
            field: "command (pass --command or set `command` in the config file)".to_string(),
        })?;

    let command = std::fs::canonicalize(&command)
        .map_err(|source| ConfigError::CommandNotFound {
            path: command.clone(),
            source,
        })?;

    if !command.is_file() {
        return Err(ConfigError::Invalid {
            message: format!("{} is not a file", command.display()),
        });
    }

    let announce = AnnounceConfig {
        address: overrides
            .announce_address
            .or(env_address)
            .or(config.announce.address),
        path: overrides
            .announce_path
            .or(config.announce.path)
            .map(absolute)
            .transpose()?,
    };
    let pidfile = overrides
        .pidfile
        .or(config.pidfile)
        .map(absolute)
        .transpose()?;

    let mut log_level = config.log_level.unwrap_or_default();
    if overrides.verbose || overrides.no_act {
        log_level = log_level.min(LogLevel::Info);
    }
    if overrides.debug {
        log_level = log_level.min(LogLevel::Debug);
    }

    Ok(ResolvedConfig {
        command,
        bootstrap: overrides.bootstrap || config.bootstrap,
        name_prefix: config.name_prefix,
        log_level,
        pidfile,
        announce,
        verbose: overrides.verbose || overrides.debug,
        no_act: overrides.no_act,
        foreground: overrides.foreground || overrides.no_act,
    })
}

/// Anchor `path` to the current directory, which daemonizing leaves
fn absolute(path: PathBuf) -> Result<PathBuf, ConfigError> {
    std::path::absolute(&path).map_err(|source| ConfigError::Io { path, source })
}
