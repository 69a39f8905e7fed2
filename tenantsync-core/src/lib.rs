// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tenantsync Core
//!
//! Leaf types shared by every tenantsync crate.
//!
//! ## Key Types
//!
//! ### Snapshots
//! - [`Snapshot`] - Immutable value + freshness read from a pool
//! - [`SnapshotState`] - Idle / Loading / Fresh / Stale / Error
//!
//! ### Errors
//! - [`FetchError`] - Failure of a fetch, commit, or fan-out call
//!
//! ### Models
//! - [`AccountInfo`] - One tenant the user is connected to
//! - [`Identity`] - The authenticated user
//! - [`ProjectInfo`], [`ActivityEntry`], [`PersonInfo`], [`TodoInfo`] - Pool payloads

pub mod error;
pub mod models;
pub mod snapshot;

pub use error::FetchError;
pub use models::{AccountInfo, ActivityEntry, Identity, PersonInfo, ProjectInfo, TodoInfo};
pub use snapshot::{Snapshot, SnapshotState};
