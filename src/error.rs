//! Error types for each stage of archive ingestion.
//!
//! Every stage surfaces its own error enum; [`IngestError`] wraps them so the
//! pipeline can propagate whatever stage failed without losing detail. The
//! transport layer decides how each maps onto a response.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while downloading an archive into its staging file.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to reach {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write staging file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while walking an archive's entry table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("unsupported archive: {0}")]
    Unsupported(String),

    #[error("failed to read staged archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while writing to or reading from the extraction cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("entry path escapes the cache directory: {0}")]
    UnsafePath(String),

    #[error("not found in cache: {0}")]
    NotFound(String),

    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Any failure of a listing or content request.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to prepare staging directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive parsing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// True when the failure is a plain cache miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestError::Cache(CacheError::NotFound(_)))
    }
}
