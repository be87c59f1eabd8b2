//! # error
//!
//! Centralised error type for the synchronization core.
//!
//! Every port (pull API, durable store) returns `SyncResult<_>`.  Components
//! catch these at their public boundary and resolve to a safe default state,
//! so a `SyncError` reaching the caller only ever describes *why* a view is
//! degraded, never a crash.
//!
//! `SyncError` is `Clone` because a single in-flight fetch outcome is shared
//! with every caller waiting on the same cache key.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The streaming channel could not be opened or was dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A pull request never produced a response (DNS, connect, timeout).
    #[error("Request failed: {0}")]
    Request(String),

    /// The pull endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A frame or response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Durable store read/write failed (quota, serialization, I/O).
    #[error("Storage error: {0}")]
    Storage(String),

    /// The caller went away before the result arrived.
    #[error("Cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Request(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
