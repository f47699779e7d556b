//! Configuration for inputplug
//!
//! This crate handles parsing the optional KDL configuration file and
//! merging it with command-line flags and the environment into the
//! settings the daemon runs with.

mod error;
mod model;
mod parser;
mod resolve;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str};
pub use resolve::resolve;
