//! Store error types.

use tenantsync_core::FetchError;
use thiserror::Error;

use crate::mutation::MutationTarget;

/// Errors raised by pools, the hub, and the settings layer.
///
/// Fetch failures are not in here: a pool stores them in its snapshot
/// instead of returning them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A mutation was applied to a pool that has no data to transform.
    #[error("pool {key} has no data to apply a mutation to")]
    NoBaseline {
        /// Pool key.
        key: String,
    },

    /// A key was resolved with a different value type than it was created with.
    #[error("pool {key} holds {existing}, not {requested}")]
    PoolTypeMismatch {
        /// Pool key.
        key: String,
        /// Type the pool was created with.
        existing: &'static str,
        /// Type requested by the caller.
        requested: &'static str,
    },

    /// A project- or tool-scoped key was resolved for a second account.
    #[error("pool {key} belongs to account {bound}, not {requested}")]
    AccountMismatch {
        /// Pool key.
        key: String,
        /// Account the pool fetches through.
        bound: String,
        /// Account the caller asked for.
        requested: String,
    },

    /// An account-scoped resource was requested with no account selected.
    #[error("no account selected")]
    NoActiveAccount,

    /// An account id that discovery did not return.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The session has been shut down.
    #[error("session is shut down")]
    ShutDown,

    /// Fetch error outside a pool (discovery, for instance).
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Fetch(e) => e.is_transient(),
            StoreError::Io(_) => true,
            _ => false,
        }
    }
}

/// A failed optimistic mutation, after rollback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{target} on {key} failed: {source}")]
pub struct MutationError {
    /// Pool the mutation was applied to.
    pub key: String,
    /// What the mutation changed.
    pub target: MutationTarget,
    /// Why the commit failed.
    #[source]
    pub source: FetchError,
}
