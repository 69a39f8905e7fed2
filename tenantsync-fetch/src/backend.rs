//! The seam between the sync layer and a concrete remote API.
//!
//! - [`AccountBackend`] - Discovers accounts and hands out per-account clients
//! - [`WorkspaceClient`] - Resource calls scoped to one account

use async_trait::async_trait;
use tenantsync_core::{
    AccountInfo, ActivityEntry, FetchError, Identity, PersonInfo, ProjectInfo, TodoInfo,
};

use crate::context::Context;

// ============================================================================
// Discovery
// ============================================================================

/// One discovered account, as reported by the authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAccount {
    /// The account.
    pub account: AccountInfo,
    /// Whether the account has lapsed.
    pub expired: bool,
}

/// Result of account discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// The authenticated user.
    pub identity: Identity,
    /// Every account the user can see, expired ones included.
    pub accounts: Vec<DiscoveredAccount>,
}

// ============================================================================
// Traits
// ============================================================================

/// Source of accounts and account-scoped clients.
#[async_trait]
pub trait AccountBackend: Send + Sync + 'static {
    /// Client type handed out per account.
    type Client: WorkspaceClient;

    /// Lists the user's identity and accounts.
    async fn discover(&self, ctx: &Context) -> Result<Discovery, FetchError>;

    /// Builds a client bound to `account_id`.
    ///
    /// Must not perform I/O; callers cache the result.
    fn client_for(&self, account_id: &str) -> Self::Client;
}

/// Resource calls against a single account.
///
/// Implementations must honour `ctx` cancellation and return
/// [`FetchError::Cancelled`] when it fires.
#[async_trait]
pub trait WorkspaceClient: Send + Sync + 'static {
    /// Account this client is bound to.
    fn account_id(&self) -> &str;

    /// Lists active projects.
    async fn projects(&self, ctx: &Context) -> Result<Vec<ProjectInfo>, FetchError>;

    /// Lists recent activity across all projects.
    async fn recent_activity(&self, ctx: &Context) -> Result<Vec<ActivityEntry>, FetchError>;

    /// Lists recent activity for one project.
    async fn project_timeline(
        &self,
        ctx: &Context,
        project_id: u64,
    ) -> Result<Vec<ActivityEntry>, FetchError>;

    /// Lists people in the account.
    async fn people(&self, ctx: &Context) -> Result<Vec<PersonInfo>, FetchError>;

    /// Lists to-dos in a to-do list.
    async fn todos(
        &self,
        ctx: &Context,
        project_id: u64,
        todolist_id: u64,
    ) -> Result<Vec<TodoInfo>, FetchError>;

    /// Marks a to-do complete or incomplete.
    async fn set_todo_completed(
        &self,
        ctx: &Context,
        project_id: u64,
        todo_id: u64,
        completed: bool,
    ) -> Result<(), FetchError>;
}

impl Discovery {
    /// Returns the accounts that have not expired, in reported order.
    pub fn active_accounts(&self) -> Vec<AccountInfo> {
        self.accounts
            .iter()
            .filter(|a| !a.expired)
            .map(|a| a.account.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_accounts_skips_expired() {
        let discovery = Discovery {
            identity: Identity::default(),
            accounts: vec![
                DiscoveredAccount {
                    account: AccountInfo::new("1", "Acme"),
                    expired: false,
                },
                DiscoveredAccount {
                    account: AccountInfo::new("2", "Old Co"),
                    expired: true,
                },
                DiscoveredAccount {
                    account: AccountInfo::new("3", "Globex"),
                    expired: false,
                },
            ],
        };

        let ids: Vec<_> = discovery
            .active_accounts()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
