//! Lightweight records for the resources pools hold.
//!
//! These are view-oriented projections of remote objects, tagged with the
//! account they came from so cross-account lists stay attributable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project, tagged with its owning account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Project identifier.
    pub id: u64,
    /// Project name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Owning account id.
    pub account_id: String,
    /// Owning account name.
    #[serde(default)]
    pub account_name: String,
    /// Last activity.
    pub updated_at: DateTime<Utc>,
}

/// One entry in an activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Recording identifier.
    pub id: u64,
    /// Title shown in the feed.
    pub title: String,
    /// Recording kind ("Todo", "Message", ...).
    pub kind: String,
    /// Author display name.
    #[serde(default)]
    pub creator: String,
    /// Project the entry belongs to.
    pub project_id: u64,
    /// Owning account id.
    pub account_id: String,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

/// A person visible in an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonInfo {
    /// Person identifier.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Job title.
    #[serde(default)]
    pub title: String,
    /// Account administrator.
    #[serde(default)]
    pub admin: bool,
}

/// A to-do item inside a to-do list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoInfo {
    /// To-do identifier.
    pub id: u64,
    /// Text of the to-do.
    pub content: String,
    /// Completion state.
    #[serde(default)]
    pub completed: bool,
    /// Due date, if any.
    #[serde(default)]
    pub due_on: Option<String>,
    /// Assignee names.
    #[serde(default)]
    pub assignees: Vec<String>,
}
