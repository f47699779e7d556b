//! KDL configuration parser

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&content)
}

/// Load the configuration file
///
/// An explicitly given file must exist. Without one, the default location
/// is tried and a missing file yields the default configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        let path = expand_path(&path.to_string_lossy());
        tracing::debug!("Loading configuration from {}", path.display());
        return parse_config(&path);
    }

    let path = expand_path(DEFAULT_CONFIG_PATH);
    if !path.exists() {
        tracing::debug!("No configuration file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    tracing::debug!("Loading configuration from {}", path.display());
    parse_config(&path)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl 4 reports spans from its own miette version
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "command" => {
                config.command = Some(expand_path(&string_arg(node)?));
            }
            "bootstrap" => {
                config.bootstrap = bool_arg(node)?;
            }
            "name-prefix" => {
                config.name_prefix = string_arg(node)?;
            }
            "log-level" => {
                let level = string_arg(node)?;
                config.log_level =
                    Some(level.parse().map_err(|e| ConfigError::Invalid { message: e })?);
            }
            "pidfile" => {
                config.pidfile = Some(expand_path(&string_arg(node)?));
            }
            "announce" => {
                config.announce = parse_announce(node)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_announce(node: &kdl::KdlNode) -> Result<AnnounceConfig, ConfigError> {
    let mut announce = AnnounceConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "address" => {
                    announce.address = Some(string_arg(child)?);
                }
                "path" => {
                    announce.path = Some(expand_path(&string_arg(child)?));
                }
                name => {
                    tracing::warn!("Unknown announce option: {}", name);
                }
            }
        }
    }

    Ok(announce)
}

/// First argument of `node` as a string
fn string_arg(node: &kdl::KdlNode) -> Result<String, ConfigError> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: format!("string value for `{}`", node.name().value()),
        })
}

/// First argument of `node` as a boolean; a bare node means `true`
fn bool_arg(node: &kdl::KdlNode) -> Result<bool, ConfigError> {
    match node.entries().first() {
        None => Ok(true),
        Some(entry) => entry.value().as_bool().ok_or_else(|| ConfigError::Invalid {
            message: format!("`{}` expects true or false", node.name().value()),
        }),
    }
}

pub(crate) fn expand_path(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}
