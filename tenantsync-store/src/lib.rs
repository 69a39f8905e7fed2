// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # tenantsync Store
//!
//! Client-side state for tenantsync.
//!
//! This crate provides:
//!
//! - **Pool**: a typed, key-addressed snapshot with stale-while-revalidate refresh
//! - **MutatingPool**: a pool that applies optimistic mutations and rolls them back
//! - **Hub**: the registry that creates pools by scope key and clears them on account switch
//! - **Session**: the hub, account directory, poller, and event channel for one login
//! - **Settings**: user preferences with JSON persistence
//!
//! ## Usage
//!
//! ```ignore
//! use tenantsync_fetch::MemoryBackend;
//! use tenantsync_store::{Session, Settings};
//!
//! let session = Session::new(MemoryBackend::demo(), &Settings::default());
//! session.start().await?;
//! let mut events = session.take_events().unwrap();
//!
//! let projects = session.hub().projects()?;
//! if let Some(cmd) = projects.fetch_if_stale(&session.context()) {
//!     session.dispatch(cmd);
//! }
//!
//! while let Some(event) = events.recv().await {
//!     if event.key() == Some(projects.key()) {
//!         println!("{} projects", projects.get().data.len());
//!     }
//! }
//! ```

pub mod error;
pub mod event;
pub mod hub;
pub mod metrics;
pub mod mutation;
pub mod persistence;
pub mod poller;
pub mod pool;
pub mod scope;
pub mod session;
pub mod settings;

pub use error::{MutationError, StoreError};
pub use event::{Cmd, HubEvent};
pub use hub::{ACTIVITY_LIMIT, Hub, TodoCompletion, timeline_cache_key};
pub use metrics::{MetricsSummary, NavigationEvent, PoolEventKind, PoolMetrics, PoolStats, PoolStatus};
pub use mutation::{MutatingPool, Mutation, MutationTarget};
pub use persistence::{
    default_config_dir, default_settings_path, ensure_dir, load_json, load_json_or_default,
    save_json,
};
pub use poller::{PollSource, Poller};
pub use pool::{Fetcher, Pool, PoolConfig, Pooler, fetcher};
pub use scope::{ScopeKey, ScopeLevel};
pub use session::Session;
pub use settings::{LogLevel, MAX_PRESET_SECS, PoolPreset, PoolPresets, Settings, SettingsStore};

#[cfg(test)]
mod persistence_tests;
