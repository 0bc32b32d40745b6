//! Error types for fetching and decoding tile content.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while fetching raw bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request never produced a response (DNS, TLS, reset, timeout).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Reading a local file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The URL could not be understood.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            FetchError::Transport { .. } => true,
            FetchError::Io { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            FetchError::InvalidUrl(_) => false,
        }
    }
}

/// Errors raised while decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} bytes for {section}, {available} available")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{0} trailing bytes after geometry")]
    TrailingBytes(usize),

    #[error("failed to inflate gzip payload: {0}")]
    Gzip(String),

    #[error("gzip payload inflates past {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("decoder task failed: {0}")]
    TaskFailed(String),

    #[error("face range {start}..={end} of feature {feature} exceeds {triangles} triangles")]
    FaceRangeOutOfBounds {
        feature: usize,
        start: u32,
        end: u32,
        triangles: usize,
    },
}

/// Failure of a single content load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Fetching failed. Transient failures may be retried by the scheduler.
    #[error("network error: {source}")]
    Network {
        #[from]
        source: FetchError,
    },

    /// The payload is malformed. Never retried.
    #[error("parse error: {0}")]
    Parse(#[from] DecodeError),

    /// The load was cancelled before it produced content.
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::Network { .. } => LoadErrorKind::Network,
            LoadError::Parse(_) => LoadErrorKind::Parse,
            LoadError::Cancelled => LoadErrorKind::Cancelled,
        }
    }

    /// Whether the scheduler may retry this load.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Network { source } => source.is_transient(),
            LoadError::Parse(_) | LoadError::Cancelled => false,
        }
    }
}

/// Simplified error kind for callbacks and stats (no error details).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadErrorKind {
    Network,
    Parse,
    Cancelled,
    /// The load stayed in flight longer than the configured timeout.
    Timeout,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadErrorKind::Network => "network",
            LoadErrorKind::Parse => "parse",
            LoadErrorKind::Cancelled => "cancelled",
            LoadErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}
