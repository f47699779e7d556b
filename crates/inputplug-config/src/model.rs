//! Configuration data model

use std::path::PathBuf;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/inputplug/config.kdl";

/// Settings read from the configuration file
///
/// Every field is optional in the file; command-line flags override them
/// during [`resolve`](crate::resolve).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Command run for every hierarchy change
    pub command: Option<PathBuf>,
    /// Replay already present devices on startup
    pub bootstrap: bool,
    /// Prefix for change names handed to the command (e.g. "XI")
    pub name_prefix: String,
    pub log_level: Option<LogLevel>,
    pub pidfile: Option<PathBuf>,
    pub announce: AnnounceConfig,
}

/// Announce transport settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceConfig {
    /// Socket address (`unix!/path`); empty selects the default socket
    pub address: Option<String>,
    /// File or FIFO receiving one line per change
    pub path: Option<PathBuf>,
}

impl AnnounceConfig {
    pub fn is_configured(&self) -> bool {
        self.address.is_some() || self.path.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Values supplied on the command line
///
/// `None`/`false` means "not given", so the file value survives.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub command: Option<PathBuf>,
    pub bootstrap: bool,
    pub announce_address: Option<String>,
    pub announce_path: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    pub verbose: bool,
    pub debug: bool,
    pub no_act: bool,
    pub foreground: bool,
}

/// Fully merged and validated settings the daemon runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Canonical path of an existing command
    pub command: PathBuf,
    pub bootstrap: bool,
    pub name_prefix: String,
    pub log_level: LogLevel,
    pub pidfile: Option<PathBuf>,
    pub announce: AnnounceConfig,
    pub verbose: bool,
    pub no_act: bool,
    /// `no_act` implies foreground
    pub foreground: bool,
}
