//! Error types for the inputplug core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up dispatch side channels
///
/// Dispatch itself never fails; these only surface when opening the
/// announce transport, and callers treat them as a degraded condition.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The announce address could not be understood
    #[error("Invalid announce address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Failed to connect to the announce socket
    #[error("Failed to connect to announce socket at {path}: {source}")]
    AnnounceConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open the announce file
    #[error("Failed to open announce file {path}: {source}")]
    AnnounceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
