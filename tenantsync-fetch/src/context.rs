//! Cancellation contexts and the epoch-owning context root.
//!
//! A [`Context`] is passed to every fetcher, mutation commit, and fan-out
//! task. It is cancelled when the user switches accounts or the session shuts
//! down, and it is stamped with the epoch it was created under so late
//! results from a previous account can be recognised and dropped.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::select_all;
use tenantsync_core::FetchError;
use tokio::sync::watch;
use tracing::debug;

// ============================================================================
// Context
// ============================================================================

/// Cloneable, cooperative cancellation handle.
///
/// Cancelling a context cancels every context derived from it with
/// [`Context::child`]; cancelling a child leaves its parent untouched.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    epoch: u64,
    cancel: watch::Sender<bool>,
    parent: Option<Context>,
}

impl Context {
    /// Creates a root context that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::with_epoch(0)
    }

    /// Creates a root context stamped with `epoch`.
    pub fn with_epoch(epoch: u64) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                epoch,
                cancel,
                parent: None,
            }),
        }
    }

    /// Derives a context that is cancelled together with this one.
    pub fn child(&self) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                epoch: self.inner.epoch,
                cancel,
                parent: Some(self.clone()),
            }),
        }
    }

    /// The epoch this context was issued under.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.inner.cancel.send_replace(true);
    }

    /// Returns true once this context or any ancestor has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.lineage().any(|ctx| *ctx.inner.cancel.borrow())
    }

    /// Returns `Err(FetchError::Cancelled)` if the context is cancelled.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once this context or any ancestor is cancelled.
    pub async fn cancelled(&self) {
        let mut receivers: Vec<watch::Receiver<bool>> = self
            .lineage()
            .map(|ctx| ctx.inner.cancel.subscribe())
            .collect();

        let waits = receivers.iter_mut().map(|rx| {
            Box::pin(async move {
                if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    // Sender gone: this link can no longer be cancelled.
                    std::future::pending::<()>().await;
                }
            })
        });

        select_all(waits).await;
    }

    /// Runs `fut` to completion unless the context is cancelled first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(FetchError::Cancelled),
            result = fut => result,
        }
    }

    fn lineage(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(Some(self), |ctx| ctx.inner.parent.as_ref())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("epoch", &self.inner.epoch)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Context Root
// ============================================================================

/// Owns the live session context and the monotonic epoch counter.
///
/// [`ContextRoot::reset_context`] cancels everything issued so far, installs
/// a fresh context, and advances the epoch in one critical section, so no
/// caller can observe the new epoch paired with the old context.
pub struct ContextRoot {
    state: RwLock<RootState>,
}

struct RootState {
    current: Context,
    epoch: u64,
    shut_down: bool,
}

impl ContextRoot {
    /// Creates a root at epoch 0.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RootState {
                current: Context::with_epoch(0),
                epoch: 0,
                shut_down: false,
            }),
        }
    }

    /// Returns the currently live context.
    pub fn context(&self) -> Context {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Returns the current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).epoch
    }

    /// Returns true if `epoch` is still the live epoch.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Cancels the live context, installs a fresh one, and bumps the epoch.
    ///
    /// Returns the new epoch.
    pub fn reset_context(&self) -> u64 {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current.cancel();
        state.epoch += 1;
        state.current = Context::with_epoch(state.epoch);
        debug!(epoch = state.epoch, "Context reset");
        state.epoch
    }

    /// Cancels the live context for good.
    pub fn shutdown(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current.cancel();
        state.shut_down = true;
        debug!(epoch = state.epoch, "Context root shut down");
    }

    /// Returns true after [`ContextRoot::shutdown`].
    pub fn is_shut_down(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .shut_down
    }
}

impl Default for ContextRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRoot")
            .field("epoch", &self.epoch())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
