//! One authenticated session: the cancellation root, the account directory,
//! the pool registry, the poller, and the event channel tying them to an
//! event loop.

use std::sync::{Arc, Mutex, PoisonError};

use tenantsync_core::AccountInfo;
use tenantsync_fetch::{AccountBackend, Context, ContextRoot, MultiStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::event::{Cmd, HubEvent};
use crate::hub::Hub;
use crate::pool::Pool;
use crate::poller::Poller;
use crate::settings::Settings;

/// Owns everything a client needs for one login.
pub struct Session<B: AccountBackend> {
    root: Arc<ContextRoot>,
    multi: Arc<MultiStore<B>>,
    hub: Hub<B>,
    poller: Poller,
    events_tx: mpsc::UnboundedSender<HubEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<HubEvent>>>,
}

impl<B: AccountBackend> Session<B> {
    /// Creates a session over `backend`. Nothing is fetched until
    /// [`Session::start`].
    pub fn new(backend: B, settings: &Settings) -> Self {
        let root = Arc::new(ContextRoot::new());
        let multi = Arc::new(MultiStore::new(backend).with_fan_out_limit(settings.fan_out_limit));
        let hub = Hub::new(root.clone(), multi.clone(), settings.presets);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            root,
            multi,
            hub,
            poller: Poller::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Discovers accounts and selects the first one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Fetch`] if discovery fails and
    /// [`StoreError::ShutDown`] after [`Session::shutdown`].
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<Vec<AccountInfo>, StoreError> {
        if self.root.is_shut_down() {
            return Err(StoreError::ShutDown);
        }
        let accounts = self.multi.discover_accounts(&self.root.context()).await?;
        if let Some(first) = accounts.first() {
            if self.hub.current_account().is_none() {
                self.hub.switch_account(&first.id);
            }
        }
        info!(accounts = accounts.len(), "Session started");
        Ok(accounts)
    }

    /// Takes the event receiver. Only the first call gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<HubEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Runs `cmd` in the background, delivering its event to the receiver.
    pub fn dispatch(&self, cmd: Cmd) -> JoinHandle<()> {
        cmd.spawn(self.events_tx.clone())
    }

    /// Dispatches every command in `cmds`.
    pub fn dispatch_all(&self, cmds: impl IntoIterator<Item = Cmd>) {
        for cmd in cmds {
            drop(self.dispatch(cmd));
        }
    }

    /// Registers `pool` with the poller and returns its first tick.
    ///
    /// `None` if the pool has polling disabled.
    pub fn poll<T>(&self, pool: &Pool<T>) -> Option<Cmd>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        if pool.config().poll_interval.is_zero() {
            return None;
        }
        self.poller.add(pool.key(), Arc::new(pool.clone()));
        self.poller.schedule(pool.key(), &self.root.context())
    }

    /// Switches the active account.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownAccount`] if `account_id` was not discovered,
    /// [`StoreError::ShutDown`] after [`Session::shutdown`].
    pub fn switch_account(&self, account_id: &str) -> Result<u64, StoreError> {
        if self.root.is_shut_down() {
            return Err(StoreError::ShutDown);
        }
        if self.multi.account(account_id).is_none() {
            return Err(StoreError::UnknownAccount(account_id.to_string()));
        }
        Ok(self.hub.switch_account(account_id))
    }

    /// The selected account.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoActiveAccount`] before an account is selected.
    pub fn current_account(&self) -> Result<AccountInfo, StoreError> {
        self.hub
            .current_account()
            .and_then(|id| self.multi.account(&id))
            .ok_or(StoreError::NoActiveAccount)
    }

    /// Cancels all work. The session cannot be restarted.
    pub fn shutdown(&self) {
        self.hub.shutdown();
    }

    /// The live context.
    pub fn context(&self) -> Context {
        self.root.context()
    }

    /// The pool registry.
    pub fn hub(&self) -> &Hub<B> {
        &self.hub
    }

    /// The account directory.
    pub fn multi(&self) -> &Arc<MultiStore<B>> {
        &self.multi
    }

    /// The poller.
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// The cancellation root.
    pub fn root(&self) -> &Arc<ContextRoot> {
        &self.root
    }
}

impl<B: AccountBackend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("epoch", &self.root.epoch())
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tenantsync_fetch::MemoryBackend;

    fn session() -> Session<MemoryBackend> {
        Session::new(
            MemoryBackend::demo().with_latency(Duration::ZERO),
            &Settings::default(),
        )
    }

    #[tokio::test]
    async fn test_start_selects_first_account() {
        let session = session();
        assert!(matches!(session.current_account(), Err(StoreError::NoActiveAccount)));

        let accounts = session.start().await.unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(session.current_account().unwrap().id, "1001");
    }

    #[tokio::test]
    async fn test_switch_to_unknown_account() {
        let session = session();
        session.start().await.unwrap();
        assert!(matches!(
            session.switch_account("9999"),
            Err(StoreError::UnknownAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_events() {
        let session = session();
        session.start().await.unwrap();
        let mut events = session.take_events().unwrap();
        assert!(session.take_events().is_none());

        let pool = session.hub().projects().unwrap();
        session.dispatch(pool.fetch(&session.context())).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.key(), Some("projects:global"));
        assert!(pool.get().is_fresh());
    }

    #[tokio::test]
    async fn test_poll_registers_channel() {
        let session = session();
        let projects = session.hub().projects().unwrap();
        assert!(session.poll(&projects).is_some());
        assert_eq!(session.poller().tags(), vec!["projects:global".to_string()]);

        let people = session.hub().people("1001").unwrap();
        assert!(session.poll(&people).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_work() {
        let session = session();
        session.shutdown();
        assert!(session.context().is_cancelled());
        assert!(matches!(session.start().await, Err(StoreError::ShutDown)));
        assert!(matches!(session.hub().projects(), Err(StoreError::ShutDown)));
    }
}
