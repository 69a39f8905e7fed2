//! Core error types for tenantsync.

use std::time::Duration;
use thiserror::Error;

/// Error produced by a fetcher, a mutation commit, or a fan-out call.
///
/// `FetchError` is `Clone` so it can live inside a [`Snapshot`](crate::Snapshot)
/// next to the data it failed to refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request's context was cancelled (account switch or shutdown).
    #[error("request cancelled")]
    Cancelled,

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Authentication was rejected by the remote API.
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by the remote API.
    #[error("rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after: Option<u64>,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Every account in a fan-out failed.
    #[error("all {count} accounts failed: {first}")]
    AllAccountsFailed {
        /// Number of accounts queried.
        count: usize,
        /// The first account's error, in account order.
        first: Box<FetchError>,
    },

    /// An error annotated with what was being attempted.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<FetchError>,
    },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Wraps this error with a description of what was being attempted.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through [`FetchError::Context`] layers.
    pub fn root(&self) -> &FetchError {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns true if this error (or any error it wraps) is a cancellation.
    ///
    /// Cancelled work is never reported to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self.root() {
            Self::Timeout(_) | Self::Transport(_) | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
