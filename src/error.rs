//! Error types for dsync.
//!
//! Every stage reports into a single [`SyncError`]; the first one recorded on
//! a transfer's manager is the one the orchestrator returns.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The request failed validation before any stage started.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A `path`, `host:path` or `host:port:path` argument could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Filesystem operation failed on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Socket or other I/O failure without a path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk failed: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// Wire-level protocol violation (bad frame, unknown packet type, ...).
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    /// The daemon refused the request.
    #[error("Transfer request rejected: {0}")]
    Rejected(String),

    /// The peer reported a failure through the status exchange.
    #[error("Remote failure: {0}")]
    Remote(String),

    /// A pipeline queue was closed while a producer still had data.
    #[error("{0} queue closed")]
    QueueClosed(&'static str),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Attach the offending path to an `io::Error`.
pub trait IoResultExt<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| SyncError::FileIo {
            path: path.to_path_buf(),
            source,
        })
    }
}
