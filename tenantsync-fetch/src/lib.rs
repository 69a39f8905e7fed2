// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tenantsync Fetch
//!
//! Everything between a pool's fetcher and the network.
//!
//! ## Cancellation
//!
//! - [`Context`] - Cloneable cancellation handle stamped with an epoch
//! - [`ContextRoot`] - Owns the live context; `reset_context` abandons all work
//!
//! ## Backends
//!
//! - [`AccountBackend`] / [`WorkspaceClient`] - The remote API seam
//! - [`HttpBackend`] - reqwest implementation with retry and timeouts
//! - [`MemoryBackend`] - In-memory implementation with latency and failure injection
//!
//! ## Multi-account
//!
//! - [`MultiStore`] - Discovered accounts, cached clients, side [`Cache`]
//! - [`FanOutResults`] - Ordered per-account results of [`MultiStore::fan_out`]
//!
//! ## Example
//!
//! ```ignore
//! use tenantsync_fetch::{Context, MemoryBackend, MultiStore, WorkspaceClient};
//!
//! let store = MultiStore::new(MemoryBackend::demo());
//! let ctx = Context::background();
//! store.discover_accounts(&ctx).await?;
//!
//! let results = store
//!     .fan_out(&ctx, |ctx, _account, client| async move { client.projects(&ctx).await })
//!     .await;
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod context;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod multistore;
pub mod retry;

pub use backend::{AccountBackend, DiscoveredAccount, Discovery, WorkspaceClient};
pub use cache::{Cache, CacheEntry, Cached};
pub use client::{HttpAccountClient, HttpBackend, HttpConfig};
pub use context::{Context, ContextRoot};
pub use error::HttpError;
pub use fanout::{AccountResult, FanOutOutcome, FanOutResults};
pub use memory::{MemoryBackend, MemoryClient};
pub use multistore::MultiStore;
pub use retry::RetryStrategy;
pub use tenantsync_core::FetchError;
