//! Errors raised by the resumable fetcher.

/// The terminal reason a fetch attempt failed, independent of the
/// underlying transport error (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Cumulative session bytes exceeded the overflow guard.
    DataOverflow,
    /// Final on-disk size did not match the expected total.
    SizeMismatch,
    /// The partial exceeded the remote length more than the restart bound allows.
    RangeNotSatisfiable,
    /// The transport closed before the expected bytes arrived.
    ConnectionReset,
    /// Time-to-first-byte exceeded the connect timeout.
    ConnectTimeout,
    /// No bytes received within the socket-inactivity window.
    SocketTimeout,
    /// A non-retryable HTTP status.
    Http(u16),
}

/// Errors from [`crate::fetch`].
///
/// Carries enough context (terminal code, attempt count, retryability,
/// bytes transferred before failure) for the orchestrator to log a
/// useful diagnostic without re-deriving it from a generic error chain.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Underlying HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error reading or writing the destination file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The fetch exhausted its retry budget or hit a non-retryable condition.
    #[error(
        "fetch failed: {code:?} after {attempt} attempt(s) (retryable={retryable}, {bytes_transferred} bytes transferred)"
    )]
    Terminal {
        code: ErrorCode,
        attempt: u32,
        retryable: bool,
        bytes_transferred: u64,
    },
}

impl DownloadError {
    /// Whether retrying this exact fetch might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Terminal { retryable, .. } => *retryable,
            Self::Http(_) | Self::Io { .. } => false,
        }
    }
}

/// Returns `true` if the HTTP status is one of the retryable codes named
/// in the fetcher's retry policy (408, 429, 500, 502, 503, 504).
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 429 | 500 | 502 | 503 | 504
    )
}

/// Returns `true` if the transport error is one of the transient classes
/// the fetcher retries (connection reset/refused, timeouts, DNS failure,
/// broken pipe, protocol errors).
#[must_use]
pub fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
