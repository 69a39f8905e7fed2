//! HTTP error types and their mapping onto [`FetchError`].

use std::time::Duration;
use tenantsync_core::FetchError;
use thiserror::Error;

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success status with the response body.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
        /// `Retry-After` header, in seconds.
        retry_after: Option<u64>,
    },

    /// Timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) if e.is_timeout() => {
                FetchError::Transport(format!("timed out: {e}"))
            }
            HttpError::Request(e) if e.is_decode() => FetchError::InvalidResponse(e.to_string()),
            HttpError::Request(e) => FetchError::Transport(e.to_string()),
            HttpError::InvalidUrl(e) => FetchError::Other(format!("invalid URL: {e}")),
            HttpError::Status {
                status,
                body,
                retry_after,
            } => match status {
                401 | 403 => FetchError::Unauthorized(body),
                404 => FetchError::NotFound(body),
                429 => FetchError::RateLimited { retry_after },
                _ => FetchError::Status {
                    status,
                    message: body,
                },
            },
            HttpError::Timeout(d) => FetchError::Timeout(d),
        }
    }
}
