//! Cross-account directory: discovered accounts, cached clients, side cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tenantsync_core::{AccountInfo, FetchError, Identity};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::backend::AccountBackend;
use crate::cache::Cache;
use crate::context::Context;

// ============================================================================
// MultiStore
// ============================================================================

/// Manages every account the user can reach.
///
/// The account list is insertion ordered and is the single source of truth
/// for account badges ([`MultiStore::account_index`]) and fan-out result
/// order. Per-account clients are created on first use and reused.
pub struct MultiStore<B: AccountBackend> {
    backend: B,
    directory: RwLock<Directory>,
    clients: RwLock<HashMap<String, Arc<B::Client>>>,
    cache: Cache,
    pub(crate) limit: Option<Arc<Semaphore>>,
}

#[derive(Default)]
struct Directory {
    accounts: Vec<AccountInfo>,
    identity: Option<Identity>,
}

impl<B: AccountBackend> MultiStore<B> {
    /// Creates an empty store over `backend`.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            directory: RwLock::new(Directory::default()),
            clients: RwLock::new(HashMap::new()),
            cache: Cache::new(),
            limit: None,
        }
    }

    /// Caps the number of accounts queried at once during fan-out.
    ///
    /// `None` (the default) runs every account concurrently.
    pub fn with_fan_out_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0).map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    /// The backend this store was built over.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks the backend for the user's identity and accounts.
    ///
    /// Expired accounts are skipped. Safe to call again; later calls
    /// replace the account list.
    #[instrument(skip(self, ctx))]
    pub async fn discover_accounts(&self, ctx: &Context) -> Result<Vec<AccountInfo>, FetchError> {
        let discovery = ctx.run(self.backend.discover(ctx)).await?;
        let accounts = discovery.active_accounts();
        let skipped = discovery.accounts.len() - accounts.len();

        {
            let mut dir = self.directory.write().unwrap_or_else(PoisonError::into_inner);
            dir.accounts.clone_from(&accounts);
            dir.identity = Some(discovery.identity);
        }

        info!(count = accounts.len(), skipped, "Discovered accounts");
        Ok(accounts)
    }

    /// Replaces the account list directly.
    pub fn set_accounts(&self, accounts: Vec<AccountInfo>) {
        self.directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts = accounts;
    }

    /// Returns a copy of the account list.
    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts
            .clone()
    }

    /// Looks up an account by id.
    pub fn account(&self, account_id: &str) -> Option<AccountInfo> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .cloned()
    }

    /// Returns the 1-based position of `account_id`, used as its badge.
    pub fn account_index(&self, account_id: &str) -> Option<usize> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .accounts
            .iter()
            .position(|a| a.id == account_id)
            .map(|i| i + 1)
    }

    /// Returns the authenticated user, once discovered.
    pub fn identity(&self) -> Option<Identity> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .identity
            .clone()
    }

    /// Returns the client for `account_id`, creating it on first use.
    pub fn client_for(&self, account_id: &str) -> Arc<B::Client> {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account_id)
        {
            return client.clone();
        }

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(account_id.to_string())
            .or_insert_with(|| {
                debug!(account = account_id, "Creating account client");
                Arc::new(self.backend.client_for(account_id))
            })
            .clone()
    }

    /// The shared side cache.
    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

impl<B: AccountBackend> fmt::Debug for MultiStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MultiStore")
            .field("accounts", &dir.accounts)
            .field("has_identity", &dir.identity.is_some())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::WorkspaceClient;

    #[tokio::test]
    async fn test_discovery_skips_expired_and_sets_identity() {
        let backend = MemoryBackend::new()
            .with_account(AccountInfo::new("1", "Acme"))
            .with_expired_account(AccountInfo::new("2", "Lapsed"))
            .with_account(AccountInfo::new("3", "Globex"));
        let store = MultiStore::new(backend);

        let accounts = store
            .discover_accounts(&Context::background())
            .await
            .unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(store.account_index("3"), Some(2));
        assert_eq!(store.account_index("2"), None);
        assert!(store.identity().is_some());
    }

    #[test]
    fn test_client_is_cached() {
        let store = MultiStore::new(MemoryBackend::new());
        let a = store.client_for("1");
        let b = store.client_for("1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.account_id(), "1");
    }
}
