//! Error types for the archive header index engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while building or querying the header tree
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("{}: file size can not be larger than 4294967295 bytes (got {size})", .path.display())]
    OversizeFile { path: PathBuf, size: u64 },

    #[error("{}: link \"{}\" points outside the archive root", .path.display(), .target.display())]
    SymlinkEscape { path: PathBuf, target: PathBuf },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("cyclic link chain at: {0}")]
    CyclicLink(String),

    #[error("invalid archive path: {0}")]
    InvalidPath(String),

    #[error("integrity digest failed for {}: {source}", .path.display())]
    Integrity {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("header serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors (logging setup)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
}
