//! Deferred work handed back to the event loop, and the events it produces.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::MutationError;

// ============================================================================
// Hub Event
// ============================================================================

/// Notification delivered to the event loop when background work finishes.
///
/// Events carry keys, not data: a view matching on a key reads the pool's
/// current snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A pool's snapshot changed.
    PoolUpdated {
        /// Pool key.
        key: String,
    },
    /// An optimistic mutation failed and was rolled back.
    MutationFailed(MutationError),
    /// A poll channel's interval elapsed.
    PollDue {
        /// Poll channel tag.
        tag: String,
    },
}

impl HubEvent {
    /// Creates a [`HubEvent::PoolUpdated`].
    pub fn pool_updated(key: impl Into<String>) -> Self {
        Self::PoolUpdated { key: key.into() }
    }

    /// Returns the pool key this event concerns, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::PoolUpdated { key } => Some(key),
            Self::MutationFailed(err) => Some(&err.key),
            Self::PollDue { .. } => None,
        }
    }
}

// ============================================================================
// Cmd
// ============================================================================

/// A unit of deferred work that resolves to at most one [`HubEvent`].
///
/// Nothing happens until the command is run or spawned. Dropping an unrun
/// command abandons the work and releases anything it reserved.
#[must_use = "a Cmd does nothing unless run or spawned"]
pub struct Cmd {
    fut: BoxFuture<'static, Option<HubEvent>>,
}

impl Cmd {
    /// Wraps a future.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = Option<HubEvent>> + Send + 'static,
    {
        Self { fut: fut.boxed() }
    }

    /// A command that emits `event` immediately.
    pub fn event(event: HubEvent) -> Self {
        Self::new(async move { Some(event) })
    }

    /// Runs the work inline.
    pub async fn run(self) -> Option<HubEvent> {
        self.fut.await
    }

    /// Runs the work on the tokio runtime, forwarding its event to `tx`.
    pub fn spawn(self, tx: mpsc::UnboundedSender<HubEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Some(event) = self.fut.await {
                // Receiver gone means the session is shutting down.
                let _ = tx.send(event);
            }
        })
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cmd").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_forwards_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Cmd::event(HubEvent::pool_updated("projects:global"))
            .spawn(tx)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.key(), Some("projects:global"));
    }

    #[tokio::test]
    async fn test_silent_cmd_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Cmd::new(async { None }).spawn(tx).await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
