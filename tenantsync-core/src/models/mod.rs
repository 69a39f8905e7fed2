//! Domain models for tenantsync.
//!
//! ## Submodules
//!
//! - [`account`] - Tenant and identity types (AccountInfo, Identity)
//! - [`workspace`] - Resource records held by pools (ProjectInfo, TodoInfo, ...)

mod account;
mod workspace;

pub use account::{AccountInfo, Identity};
pub use workspace::{ActivityEntry, PersonInfo, ProjectInfo, TodoInfo};
#[cfg(test)]
mod serde_tests;
