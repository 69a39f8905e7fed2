//! Optimistic mutations.
//!
//! A [`MutatingPool`] writes a mutation's local effect before the remote
//! commit starts, so the UI reflects the change immediately. The pool keeps
//! the last value the server confirmed plus every mutation still waiting on
//! its commit, in the order they were applied. The visible value is always
//! the confirmed value with the pending mutations replayed on top:
//!
//! - a successful commit folds the mutation into the confirmed value;
//! - a failed commit drops the mutation and replays the rest;
//! - a refetch replaces the confirmed value and replays whatever the server
//!   does not reflect yet.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tenantsync_core::{FetchError, Snapshot, SnapshotState};
use tenantsync_fetch::Context;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{MutationError, StoreError};
use crate::event::{Cmd, HubEvent};
use crate::pool::{Fetcher, Pool, PoolConfig, PoolState};

// ============================================================================
// Mutation
// ============================================================================

/// What a mutation changes, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationTarget {
    /// Verb, e.g. "complete".
    pub action: String,
    /// Resource kind, e.g. "todo".
    pub resource: String,
    /// Resource id, if the mutation targets one record.
    pub id: Option<u64>,
}

impl MutationTarget {
    /// Creates a target without an id.
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            id: None,
        }
    }

    /// Sets the resource id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.resource)?;
        if let Some(id) = self.id {
            write!(f, " #{id}")?;
        }
        Ok(())
    }
}

/// A local transformation paired with the remote call that makes it stick.
pub trait Mutation<T>: Send + Sync + 'static {
    /// Describes the change.
    fn describe(&self) -> MutationTarget {
        MutationTarget::new("update", "record")
    }

    /// Returns `current` with the change applied. Must be pure.
    fn apply_optimistic(&self, current: &T) -> T;

    /// True when server data already contains this change.
    ///
    /// A refetch drops reflected mutations instead of replaying them.
    fn is_reflected_in(&self, _remote: &T) -> bool {
        false
    }

    /// Performs the change remotely.
    fn commit(&self, ctx: &Context) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Object-safe half of [`Mutation`], kept in the pending list.
trait Replay<T>: Send + Sync {
    fn replay(&self, current: &T) -> T;
    fn reflected_in(&self, remote: &T) -> bool;
}

impl<T, M: Mutation<T>> Replay<T> for M {
    fn replay(&self, current: &T) -> T {
        self.apply_optimistic(current)
    }

    fn reflected_in(&self, remote: &T) -> bool {
        self.is_reflected_in(remote)
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Confirmed value and pending mutations of one pool.
///
/// Lives in the pool's state so fetches, writes and commits see it under
/// the same lock. Empty for pools nobody mutates.
pub(crate) struct Ledger<T> {
    /// Last server-confirmed snapshot. Set while anything is pending.
    confirmed: Option<Confirmed<T>>,
    pending: Vec<Pending<T>>,
    next_id: u64,
}

struct Confirmed<T> {
    snapshot: Snapshot<T>,
    stored_at: Option<Instant>,
}

struct Pending<T> {
    id: u64,
    mutation: Arc<dyn Replay<T>>,
    /// Another mutation was pending at some point during this one's life.
    overlapped: bool,
}

impl<T> Default for Ledger<T> {
    fn default() -> Self {
        Self {
            confirmed: None,
            pending: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T: Clone> Ledger<T> {
    /// Number of mutations waiting on their commit.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Takes `remote` as the new confirmed value and returns what readers
    /// should see: `remote` with unreflected pending mutations replayed.
    pub(crate) fn rebase(&mut self, remote: T) -> T {
        if self.pending.is_empty() {
            self.confirmed = None;
            return remote;
        }

        self.pending.retain(|p| !p.mutation.reflected_in(&remote));
        let visible = self.replay(&remote);
        self.confirmed = if self.pending.is_empty() {
            None
        } else {
            Some(Confirmed {
                snapshot: Snapshot {
                    data: remote,
                    has_data: true,
                    state: SnapshotState::Fresh,
                    err: None,
                    fetched_at: Some(chrono::Utc::now()),
                },
                stored_at: Some(Instant::now()),
            })
        };
        visible
    }

    fn replay(&self, base: &T) -> T {
        self.pending
            .iter()
            .fold(base.clone(), |data, p| p.mutation.replay(&data))
    }

    /// Queues `mutation`; the first one pins the current value as confirmed.
    fn push(
        &mut self,
        current: &Snapshot<T>,
        stored_at: Option<Instant>,
        mutation: Arc<dyn Replay<T>>,
    ) -> u64 {
        if self.pending.is_empty() {
            self.confirmed = Some(Confirmed {
                snapshot: current.clone(),
                stored_at,
            });
        }
        let overlapped = !self.pending.is_empty();
        for p in &mut self.pending {
            p.overlapped = true;
        }
        self.next_id += 1;
        self.pending.push(Pending {
            id: self.next_id,
            mutation,
            overlapped,
        });
        self.next_id
    }

    fn take(&mut self, id: u64) -> Option<Pending<T>> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        Some(self.pending.remove(index))
    }
}

// ============================================================================
// Mutating Pool
// ============================================================================

/// A [`Pool`] that accepts optimistic mutations.
pub struct MutatingPool<T> {
    pool: Pool<T>,
}

impl<T> Clone for MutatingPool<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<T> MutatingPool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Creates an empty mutating pool.
    pub fn new(key: impl Into<String>, config: PoolConfig, fetcher: Fetcher<T>) -> Self {
        Self {
            pool: Pool::new(key, config, fetcher),
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool<T> {
        &self.pool
    }

    /// See [`Pool::key`].
    pub fn key(&self) -> &str {
        self.pool.key()
    }

    /// See [`Pool::get`].
    pub fn get(&self) -> Snapshot<T> {
        self.pool.get()
    }

    /// See [`Pool::version`].
    pub fn version(&self) -> u64 {
        self.pool.version()
    }

    /// Mutations whose commit has not settled yet.
    pub fn pending(&self) -> usize {
        self.pool.read().ledger.pending_len()
    }

    /// Takes `data` as confirmed and replays pending mutations on it.
    pub fn set(&self, data: T) {
        self.pool.set(data);
    }

    /// Refetches. The result is reconciled with pending mutations rather
    /// than overwriting them.
    pub fn fetch(&self, ctx: &Context) -> Cmd {
        self.pool.fetch(ctx)
    }

    /// See [`Pool::fetch_if_stale`].
    pub fn fetch_if_stale(&self, ctx: &Context) -> Option<Cmd> {
        self.pool.fetch_if_stale(ctx)
    }

    /// See [`Pool::invalidate`].
    pub fn invalidate(&self) {
        self.pool.invalidate();
    }

    /// Resets to empty and forgets pending mutations.
    pub fn clear(&self) {
        self.pool.clear();
    }

    /// Applies `mutation` locally and returns the command that commits it.
    ///
    /// The optimistic value is visible through [`MutatingPool::get`] as soon
    /// as this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoBaseline`] if the pool holds no usable data;
    /// nothing is written in that case.
    pub fn apply<M: Mutation<T>>(&self, ctx: &Context, mutation: M) -> Result<Cmd, StoreError> {
        self.apply_inner(ctx, mutation, false)
    }

    /// Like [`MutatingPool::apply`], but refetches after a successful commit
    /// to pick up server-assigned fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoBaseline`] if the pool holds no usable data.
    pub fn apply_and_refresh<M: Mutation<T>>(
        &self,
        ctx: &Context,
        mutation: M,
    ) -> Result<Cmd, StoreError> {
        self.apply_inner(ctx, mutation, true)
    }

    fn apply_inner<M: Mutation<T>>(
        &self,
        ctx: &Context,
        mutation: M,
        refresh: bool,
    ) -> Result<Cmd, StoreError> {
        let key = self.pool.key().to_string();
        let mutation = Arc::new(mutation);
        let (id, generation) = {
            let mut state = self.pool.write();
            if !self.pool.aged(&state).usable() {
                return Err(StoreError::NoBaseline { key });
            }

            let snapshot = state.snapshot.clone();
            let stored_at = state.stored_at;
            let id = state.ledger.push(&snapshot, stored_at, mutation.clone());
            let optimistic = mutation.apply_optimistic(&snapshot.data);
            Pool::store(&mut state, optimistic, Some(ctx.epoch()));
            (id, state.generation)
        };
        debug!(key = %key, mutation = %mutation.describe(), id, "Applied optimistic mutation");

        let this = self.clone();
        let ctx = ctx.clone();
        Ok(Cmd::new(async move {
            let result = ctx.run(mutation.commit(&ctx)).await;
            match result {
                Ok(()) => {
                    this.confirm(generation, id);
                    if refresh && !ctx.is_cancelled() {
                        return Some(
                            this.pool
                                .fetch(&ctx)
                                .run()
                                .await
                                .unwrap_or_else(|| HubEvent::pool_updated(key)),
                        );
                    }
                    Some(HubEvent::pool_updated(key))
                }
                Err(err) => {
                    this.rollback(generation, id);
                    if err.is_cancelled() || ctx.is_cancelled() {
                        debug!(key = %key, id, "Mutation cancelled, rolled back");
                        return Some(HubEvent::pool_updated(key));
                    }
                    let target = mutation.describe();
                    warn!(key = %key, mutation = %target, error = %err, "Mutation failed, rolled back");
                    Some(HubEvent::MutationFailed(MutationError {
                        key,
                        target,
                        source: err,
                    }))
                }
            }
        }))
    }

    /// Folds a committed mutation into the confirmed value.
    fn confirm(&self, generation: u64, id: u64) {
        let mut state = self.pool.write();
        if state.generation != generation {
            return;
        }
        let ledger = &mut state.ledger;
        let Some(done) = ledger.take(id) else {
            return;
        };
        if ledger.pending.is_empty() {
            ledger.confirmed = None;
        } else if let Some(confirmed) = ledger.confirmed.as_mut() {
            confirmed.snapshot.data = done.mutation.replay(&confirmed.snapshot.data);
        }
    }

    /// Drops a failed mutation and rebuilds the visible value without it.
    fn rollback(&self, generation: u64, id: u64) {
        let mut state = self.pool.write();
        if state.generation != generation {
            return;
        }
        let Some(failed) = state.ledger.take(id) else {
            return;
        };
        let Some(confirmed) = state.ledger.confirmed.take() else {
            return;
        };

        if !failed.overlapped && state.ledger.pending.is_empty() {
            state.snapshot = confirmed.snapshot;
            state.stored_at = confirmed.stored_at;
            state.version += 1;
            return;
        }

        // Others touched the value meanwhile; serve the rebuild as stale so
        // the next refresh reconciles with the server.
        let data = state.ledger.replay(&confirmed.snapshot.data);
        if !state.ledger.pending.is_empty() {
            state.ledger.confirmed = Some(confirmed);
        }
        Self::restore_stale(&mut state, data);
    }

    fn restore_stale(state: &mut PoolState<T>, data: T) {
        state.snapshot.data = data;
        state.snapshot.has_data = true;
        state.snapshot.state = SnapshotState::Stale;
        state.version += 1;
    }
}

impl<T> fmt::Debug for MutatingPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutatingPool").field(&self.pool).finish()
    }
}
