//! Composite pool keys.
//!
//! Every pool is addressed by a resource name plus the scope it lives in.
//! The scope decides both the key format and which pools an account switch
//! clears.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How widely a pool's data is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    /// Aggregated across all accounts.
    Global,
    /// One account.
    Account,
    /// One project.
    Project,
    /// One tool (to-do list, message board) inside a project.
    Tool,
}

impl ScopeLevel {
    /// All levels, widest first.
    pub const ALL: [ScopeLevel; 4] = [
        ScopeLevel::Global,
        ScopeLevel::Account,
        ScopeLevel::Project,
        ScopeLevel::Tool,
    ];

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeLevel::Global => "global",
            ScopeLevel::Account => "account",
            ScopeLevel::Project => "project",
            ScopeLevel::Tool => "tool",
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource name bound to a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// `"{resource}:global"`
    Global {
        /// Resource name.
        resource: String,
    },
    /// `"{resource}:account:{account}"`
    Account {
        /// Resource name.
        resource: String,
        /// Account id.
        account: String,
    },
    /// `"{resource}:{project}"`
    Project {
        /// Resource name.
        resource: String,
        /// Project id.
        project: u64,
    },
    /// `"{resource}:{project}:{tool}"`
    Tool {
        /// Resource name.
        resource: String,
        /// Project id.
        project: u64,
        /// Tool id.
        tool: u64,
    },
}

impl ScopeKey {
    /// Global key for `resource`.
    pub fn global(resource: impl Into<String>) -> Self {
        Self::Global {
            resource: resource.into(),
        }
    }

    /// Account key for `resource`.
    pub fn account(resource: impl Into<String>, account: impl Into<String>) -> Self {
        Self::Account {
            resource: resource.into(),
            account: account.into(),
        }
    }

    /// Project key for `resource`.
    pub fn project(resource: impl Into<String>, project: u64) -> Self {
        Self::Project {
            resource: resource.into(),
            project,
        }
    }

    /// Tool key for `resource`.
    pub fn tool(resource: impl Into<String>, project: u64, tool: u64) -> Self {
        Self::Tool {
            resource: resource.into(),
            project,
            tool,
        }
    }

    /// The scope this key lives in.
    pub fn level(&self) -> ScopeLevel {
        match self {
            Self::Global { .. } => ScopeLevel::Global,
            Self::Account { .. } => ScopeLevel::Account,
            Self::Project { .. } => ScopeLevel::Project,
            Self::Tool { .. } => ScopeLevel::Tool,
        }
    }

    /// The resource name.
    pub fn resource(&self) -> &str {
        match self {
            Self::Global { resource }
            | Self::Account { resource, .. }
            | Self::Project { resource, .. }
            | Self::Tool { resource, .. } => resource,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global { resource } => write!(f, "{resource}:global"),
            Self::Account { resource, account } => write!(f, "{resource}:account:{account}"),
            Self::Project { resource, project } => write!(f, "{resource}:{project}"),
            Self::Tool {
                resource,
                project,
                tool,
            } => write!(f, "{resource}:{project}:{tool}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(ScopeKey::global("projects").to_string(), "projects:global");
        assert_eq!(
            ScopeKey::account("people", "1001").to_string(),
            "people:account:1001"
        );
        assert_eq!(ScopeKey::project("timeline", 42).to_string(), "timeline:42");
        assert_eq!(ScopeKey::tool("todos", 42, 7).to_string(), "todos:42:7");
    }

    #[test]
    fn test_levels() {
        assert_eq!(ScopeKey::global("a").level(), ScopeLevel::Global);
        assert_eq!(ScopeKey::tool("a", 1, 2).level(), ScopeLevel::Tool);
        assert_eq!(ScopeKey::tool("todos", 1, 2).resource(), "todos");
        assert_eq!(ScopeLevel::Account.to_string(), "account");
    }
}
