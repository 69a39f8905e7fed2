//! Typed, key-addressed cache entries with stale-while-revalidate semantics.
//!
//! A [`Pool`] holds one logical data set (the project list, one to-do list,
//! an account's people). Reads are synchronous and never touch the network;
//! refreshes are handed back to the caller as a [`Cmd`] that runs the
//! fetcher off the lock and reports completion with
//! [`HubEvent::PoolUpdated`].
//!
//! Completions are discarded silently when their context was cancelled,
//! when the pool was cleared while they ran, or when a write from a newer
//! epoch already landed. This is what makes account switches race free.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tenantsync_core::{FetchError, Snapshot, SnapshotState};
use tenantsync_fetch::Context;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::event::{Cmd, HubEvent};
use crate::metrics::{PoolEventKind, PoolMetrics, PoolStatus};
use crate::mutation::Ledger;

/// Poll intervals are multiplied by this while push updates are connected.
const PUSH_MODE_FACTOR: u32 = 10;

// ============================================================================
// Fetcher
// ============================================================================

/// Produces a pool's data. Must honour the context's cancellation.
pub type Fetcher<T> =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<T, FetchError>> + Send + Sync>;

/// Boxes an async closure into a [`Fetcher`].
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

// ============================================================================
// Pool Config
// ============================================================================

/// Timing behaviour of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolConfig {
    /// How long data stays fresh. Zero means it never ages.
    pub fresh_ttl: Duration,
    /// How long stale data is served after `fresh_ttl`. Zero means forever.
    pub stale_ttl: Duration,
    /// Poll interval while focused. Zero disables polling.
    pub poll_interval: Duration,
    /// Poll interval while blurred. Zero falls back to `poll_interval`.
    pub poll_background: Duration,
    /// Upper bound for miss backoff. Zero means unbounded.
    pub poll_max: Duration,
}

impl PoolConfig {
    /// Creates a config with the given TTLs and no polling.
    pub fn new(fresh_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            fresh_ttl,
            stale_ttl,
            ..Self::default()
        }
    }

    /// Enables adaptive polling.
    pub fn with_polling(mut self, focused: Duration, background: Duration, max: Duration) -> Self {
        self.poll_interval = focused;
        self.poll_background = background;
        self.poll_max = max;
        self
    }
}

// ============================================================================
// Pool
// ============================================================================

/// A typed, self-refreshing data source. Cheap to clone; clones share state.
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    key: String,
    config: PoolConfig,
    fetcher: Fetcher<T>,
    metrics: OnceLock<Arc<PoolMetrics>>,
    state: RwLock<PoolState<T>>,
}

pub(crate) struct PoolState<T> {
    pub(crate) snapshot: Snapshot<T>,
    /// Monotonic twin of `snapshot.fetched_at`, used for TTL arithmetic.
    pub(crate) stored_at: Option<Instant>,
    pub(crate) version: u64,
    pub(crate) generation: u64,
    /// Epoch of the newest context that wrote data.
    epoch: u64,
    in_flight: usize,
    focused: bool,
    push_mode: bool,
    hits: u64,
    misses: u64,
    consecutive_misses: u32,
    pub(crate) ledger: Ledger<T>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Pool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Creates an empty pool.
    pub fn new(key: impl Into<String>, config: PoolConfig, fetcher: Fetcher<T>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                key: key.into(),
                config,
                fetcher,
                metrics: OnceLock::new(),
                state: RwLock::new(PoolState {
                    snapshot: Snapshot::empty(),
                    stored_at: None,
                    version: 0,
                    generation: 0,
                    epoch: 0,
                    in_flight: 0,
                    focused: true,
                    push_mode: false,
                    hits: 0,
                    misses: 0,
                    consecutive_misses: 0,
                    ledger: Ledger::default(),
                }),
            }),
        }
    }

    /// Starts reporting fetch telemetry to `metrics`. Only the first call counts.
    pub fn attach_metrics(&self, metrics: Arc<PoolMetrics>) {
        let _ = self.inner.metrics.set(metrics);
    }

    /// The pool's key.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The pool's timing configuration.
    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    /// Returns the current snapshot, aged by the TTLs. Never blocks on I/O.
    pub fn get(&self) -> Snapshot<T> {
        let state = self.read();
        self.aged(&state)
    }

    /// Current data version; bumps on every data change.
    pub fn version(&self) -> u64 {
        self.read().version
    }

    /// Overwrites the data as fresh.
    ///
    /// Pending optimistic mutations are replayed on top of `data`.
    pub fn set(&self, data: T) {
        let mut state = self.write();
        let data = state.ledger.rebase(data);
        Self::store(&mut state, data, None);
        trace!(key = %self.inner.key, version = state.version, "Pool set");
    }

    /// Marks fresh data stale without dropping it.
    pub fn invalidate(&self) {
        let mut state = self.write();
        if state.snapshot.has_data && state.snapshot.state == SnapshotState::Fresh {
            state.snapshot.state = SnapshotState::Stale;
            debug!(key = %self.inner.key, "Pool invalidated");
        }
    }

    /// Resets to empty. Fetches started before the clear are discarded.
    pub fn clear(&self) {
        let mut state = self.write();
        state.snapshot = Snapshot::empty();
        state.stored_at = None;
        state.version += 1;
        state.generation += 1;
        state.in_flight = 0;
        state.ledger = Ledger::default();
        debug!(key = %self.inner.key, generation = state.generation, "Pool cleared");
    }

    /// Returns a command that runs the fetcher and stores its result.
    ///
    /// While the fetch runs, [`SnapshotState::Loading`] is visible only if
    /// the pool had no data; otherwise readers keep seeing the old value.
    pub fn fetch(&self, ctx: &Context) -> Cmd {
        let ticket = {
            let mut state = self.write();
            state.in_flight += 1;
            let placeholder = !state.snapshot.has_data;
            if placeholder {
                state.snapshot.state = SnapshotState::Loading;
            }
            FetchTicket {
                pool: self.clone(),
                generation: state.generation,
                placeholder,
                settled: false,
            }
        };
        self.record(PoolEventKind::FetchStart, Duration::ZERO);

        let pool = self.clone();
        let ctx = ctx.clone();
        Cmd::new(async move {
            let mut ticket = ticket;
            let started = Instant::now();
            let result = if ctx.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                (pool.inner.fetcher)(ctx.clone()).await
            };
            pool.complete(&mut ticket, &ctx, result, started.elapsed())
        })
    }

    /// Runs a fetch inline and returns the resulting snapshot.
    pub async fn fetch_now(&self, ctx: &Context) -> Snapshot<T> {
        let _ = self.fetch(ctx).run().await;
        self.get()
    }

    /// Returns a fetch command unless the data is fresh or a fetch is running.
    pub fn fetch_if_stale(&self, ctx: &Context) -> Option<Cmd> {
        if self.is_fresh_or_fetching() {
            None
        } else {
            Some(self.fetch(ctx))
        }
    }

    /// Marks whether the view consuming this pool has focus.
    pub fn set_focused(&self, focused: bool) {
        let mut state = self.write();
        state.focused = focused;
        if focused {
            state.consecutive_misses = 0;
        }
    }

    /// Enables or disables push mode, which stretches poll intervals.
    pub fn set_push_mode(&self, enabled: bool) {
        self.write().push_mode = enabled;
    }

    /// Records a poll that brought new data.
    pub fn record_hit(&self) {
        let mut state = self.write();
        state.hits += 1;
        state.consecutive_misses = 0;
    }

    /// Records a poll that brought nothing new.
    pub fn record_miss(&self) {
        let mut state = self.write();
        state.misses += 1;
        state.consecutive_misses = state.consecutive_misses.saturating_add(1);
    }

    /// Recommended polling interval given focus, push mode, and misses.
    ///
    /// Zero when polling is disabled.
    pub fn poll_interval(&self) -> Duration {
        let state = self.read();
        self.poll_interval_locked(&state)
    }

    /// Live status for telemetry.
    pub fn status(&self) -> PoolStatus {
        let state = self.read();
        let snapshot = self.aged(&state);
        PoolStatus {
            key: self.inner.key.clone(),
            state: snapshot.state,
            has_data: snapshot.has_data,
            fetched_at: snapshot.fetched_at,
            poll_interval: self.poll_interval_locked(&state),
            hits: state.hits,
            misses: state.misses,
            version: state.version,
        }
    }

    // ------------------------------------------------------------------------
    // Internals shared with MutatingPool
    // ------------------------------------------------------------------------

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, PoolState<T>> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PoolState<T>> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `data` as fresh. `epoch` is the writer's context epoch, if any.
    pub(crate) fn store(state: &mut PoolState<T>, data: T, epoch: Option<u64>) {
        state.snapshot = Snapshot {
            data,
            has_data: true,
            state: SnapshotState::Fresh,
            err: None,
            fetched_at: Some(Utc::now()),
        };
        state.stored_at = Some(Instant::now());
        state.version += 1;
        if let Some(epoch) = epoch {
            state.epoch = state.epoch.max(epoch);
        }
    }

    /// Applies TTL aging to the stored snapshot.
    pub(crate) fn aged(&self, state: &PoolState<T>) -> Snapshot<T> {
        let mut snapshot = state.snapshot.clone();
        let config = &self.inner.config;
        if !snapshot.has_data || config.fresh_ttl.is_zero() {
            return snapshot;
        }
        let Some(stored_at) = state.stored_at else {
            return snapshot;
        };

        let age = stored_at.elapsed();
        if age < config.fresh_ttl {
            return snapshot;
        }
        // A window too large to represent never closes.
        let expired = config
            .fresh_ttl
            .checked_add(config.stale_ttl)
            .is_some_and(|window| !config.stale_ttl.is_zero() && age >= window);
        if expired {
            return Snapshot::empty();
        }
        if snapshot.state == SnapshotState::Fresh {
            snapshot.state = SnapshotState::Stale;
        }
        snapshot
    }

    fn is_fresh_or_fetching(&self) -> bool {
        let state = self.read();
        state.in_flight > 0 || self.aged(&state).is_fresh()
    }

    fn poll_interval_locked(&self, state: &PoolState<T>) -> Duration {
        let config = &self.inner.config;
        if config.poll_interval.is_zero() {
            return Duration::ZERO;
        }

        let mut base = config.poll_interval;
        if !state.focused && !config.poll_background.is_zero() {
            base = config.poll_background;
        }
        if state.push_mode {
            base = base.saturating_mul(PUSH_MODE_FACTOR);
        }

        let mut interval = base;
        for _ in 0..state.consecutive_misses {
            interval = interval.saturating_mul(2);
            if !config.poll_max.is_zero() && interval >= config.poll_max {
                return config.poll_max;
            }
        }
        interval
    }

    fn complete(
        &self,
        ticket: &mut FetchTicket<T>,
        ctx: &Context,
        result: Result<T, FetchError>,
        elapsed: Duration,
    ) -> Option<HubEvent> {
        let key = &self.inner.key;
        let mut state = self.write();
        ticket.settle(&mut state);

        let cancelled = ctx.is_cancelled() || result.as_ref().is_err_and(FetchError::is_cancelled);
        if cancelled || state.generation != ticket.generation || ctx.epoch() < state.epoch {
            debug!(
                key = %key,
                cancelled,
                epoch = ctx.epoch(),
                pool_epoch = state.epoch,
                "Discarding fetch result"
            );
            return None;
        }

        match result {
            Ok(data) => {
                let data = state.ledger.rebase(data);
                Self::store(&mut state, data, Some(ctx.epoch()));
                drop(state);
                self.record(PoolEventKind::FetchComplete, elapsed);
                debug!(key = %key, elapsed_ms = elapsed.as_millis(), "Fetch complete");
            }
            Err(err) => {
                debug!(key = %key, error = %err, "Fetch failed");
                state.snapshot.state = SnapshotState::Error;
                state.snapshot.err = Some(err);
                drop(state);
                self.record(PoolEventKind::FetchError, elapsed);
            }
        }
        Some(HubEvent::pool_updated(key.clone()))
    }

    fn record(&self, kind: PoolEventKind, elapsed: Duration) {
        if let Some(metrics) = self.inner.metrics.get() {
            metrics.record(&self.inner.key, kind, elapsed);
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("key", &self.inner.key)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Fetch Ticket
// ============================================================================

/// Reservation held by a running fetch.
///
/// Releases the in-flight slot exactly once, either when the fetch settles
/// or when its command is dropped unfinished. In the latter case a
/// `Loading` placeholder the fetch put up is taken back down.
struct FetchTicket<T: Clone + Default + Send + Sync + 'static> {
    pool: Pool<T>,
    generation: u64,
    placeholder: bool,
    settled: bool,
}

impl<T: Clone + Default + Send + Sync + 'static> FetchTicket<T> {
    fn settle(&mut self, state: &mut PoolState<T>) {
        if self.settled {
            return;
        }
        self.settled = true;
        if state.generation != self.generation {
            return;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        if self.placeholder
            && state.in_flight == 0
            && !state.snapshot.has_data
            && state.snapshot.state == SnapshotState::Loading
        {
            state.snapshot.state = SnapshotState::Idle;
        }
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Drop for FetchTicket<T> {
    fn drop(&mut self) {
        if !self.settled {
            let pool = self.pool.clone();
            let mut state = pool.write();
            self.settle(&mut state);
        }
    }
}

// ============================================================================
// Pooler
// ============================================================================

/// Type-erased pool lifecycle, used by the hub to manage pools uniformly.
pub trait Pooler: Send + Sync {
    /// Pool key.
    fn key(&self) -> &str;
    /// Marks fresh data stale.
    fn invalidate(&self);
    /// Resets to empty.
    fn clear(&self);
    /// Live status.
    fn status(&self) -> PoolStatus;
}

impl<T> Pooler for Pool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        Pool::key(self)
    }

    fn invalidate(&self) {
        Pool::invalidate(self);
    }

    fn clear(&self) {
        Pool::clear(self);
    }

    fn status(&self) -> PoolStatus {
        Pool::status(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pool(config: PoolConfig) -> (Pool<Vec<u32>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let pool = Pool::new(
            "test:global",
            config,
            fetcher(move |_ctx| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(vec![u32::try_from(n).unwrap_or(0)]) }
            }),
        );
        (pool, calls)
    }

    fn failing_pool() -> Pool<Vec<u32>> {
        Pool::new(
            "failing:global",
            PoolConfig::default(),
            fetcher(|_ctx| async { Err(FetchError::Transport("down".into())) }),
        )
    }

    #[test]
    fn test_get_on_new_pool_is_idle() {
        let (pool, calls) = counting_pool(PoolConfig::default());
        let snap = pool.get();
        assert_eq!(snap.state, SnapshotState::Idle);
        assert!(!snap.usable());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_fetch_is_fresh() {
        let (pool, _) = counting_pool(PoolConfig::default());
        let event = pool.fetch(&Context::background()).run().await;
        assert_eq!(event, Some(HubEvent::pool_updated("test:global")));

        let snap = pool.get();
        assert!(snap.usable());
        assert!(snap.is_fresh());
        assert!(snap.fetched_at.is_some());
        assert_eq!(pool.version(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_data() {
        let pool = failing_pool();
        let event = pool.fetch(&Context::background()).run().await;
        assert!(event.is_some());

        let snap = pool.get();
        assert!(!snap.usable());
        assert_eq!(snap.state, SnapshotState::Error);
        assert!(snap.err.is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_data() {
        let pool = failing_pool();
        pool.set(vec![7]);
        let _ = pool.fetch(&Context::background()).run().await;

        let snap = pool.get();
        assert!(snap.usable());
        assert_eq!(snap.data, vec![7]);
        assert_eq!(snap.state, SnapshotState::Error);
    }

    #[tokio::test]
    async fn test_loading_only_shown_without_data() {
        let (pool, _) = counting_pool(PoolConfig::default());
        let cmd = pool.fetch(&Context::background());
        assert!(pool.get().is_loading());
        let _ = cmd.run().await;

        pool.invalidate();
        let cmd = pool.fetch(&Context::background());
        assert_eq!(pool.get().state, SnapshotState::Stale);
        let _ = cmd.run().await;
    }

    #[test]
    fn test_dropped_cmd_releases_placeholder() {
        let (pool, calls) = counting_pool(PoolConfig::default());
        let cmd = pool.fetch(&Context::background());
        assert!(pool.get().is_loading());
        assert!(pool.fetch_if_stale(&Context::background()).is_none());

        drop(cmd);
        assert_eq!(pool.get().state, SnapshotState::Idle);
        assert!(pool.fetch_if_stale(&Context::background()).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_if_stale_counts() {
        let (pool, calls) = counting_pool(PoolConfig::default());
        let ctx = Context::background();

        pool.fetch_if_stale(&ctx).unwrap().run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(pool.fetch_if_stale(&ctx).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        pool.invalidate();
        pool.fetch_if_stale(&ctx).unwrap().run().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_aging_on_read() {
        let config = PoolConfig::new(Duration::from_secs(10), Duration::from_secs(20));
        let (pool, _) = counting_pool(config);
        pool.set(vec![1]);
        assert!(pool.get().is_fresh());

        tokio::time::advance(Duration::from_secs(11)).await;
        let snap = pool.get();
        assert_eq!(snap.state, SnapshotState::Stale);
        assert_eq!(snap.data, vec![1]);
        assert!(pool.fetch_if_stale(&Context::background()).is_some());

        tokio::time::advance(Duration::from_secs(20)).await;
        let snap = pool.get();
        assert!(!snap.usable());
        assert_eq!(snap.state, SnapshotState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_stale_ttl_keeps_data() {
        let (pool, _) = counting_pool(PoolConfig::new(Duration::from_secs(1), Duration::ZERO));
        pool.set(vec![1]);
        tokio::time::advance(Duration::from_secs(3600)).await;
        let snap = pool.get();
        assert!(snap.usable());
        assert_eq!(snap.state, SnapshotState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_stale_ttl_does_not_overflow() {
        let config = PoolConfig::new(Duration::from_secs(1), Duration::from_secs(u64::MAX));
        let (pool, _) = counting_pool(config);
        pool.set(vec![1]);
        tokio::time::advance(Duration::from_secs(2)).await;

        let snap = pool.get();
        assert!(snap.usable());
        assert_eq!(snap.state, SnapshotState::Stale);
    }

    #[tokio::test]
    async fn test_cancelled_context_discards_result() {
        let (pool, _) = counting_pool(PoolConfig::default());
        let ctx = Context::background();
        let cmd = pool.fetch(&ctx);
        ctx.cancel();

        assert_eq!(cmd.run().await, None);
        assert_eq!(pool.get().state, SnapshotState::Idle);
        assert_eq!(pool.version(), 0);
    }

    #[tokio::test]
    async fn test_clear_discards_in_flight_fetch() {
        let (pool, _) = counting_pool(PoolConfig::default());
        pool.set(vec![9]);
        let cmd = pool.fetch(&Context::background());
        pool.clear();

        assert_eq!(cmd.run().await, None);
        assert!(!pool.get().usable());
    }

    #[tokio::test]
    async fn test_older_epoch_cannot_overwrite_newer() {
        let (pool, _) = counting_pool(PoolConfig::default());
        let old = Context::with_epoch(1);
        let new = Context::with_epoch(2);

        let old_cmd = pool.fetch(&old);
        let _ = pool.fetch(&new).run().await;
        let newer = pool.get().data;

        assert_eq!(old_cmd.run().await, None);
        assert_eq!(pool.get().data, newer);
    }

    #[test]
    fn test_poll_interval_backoff() {
        let config = PoolConfig::default().with_polling(
            Duration::from_secs(10),
            Duration::from_secs(60),
            Duration::from_secs(100),
        );
        let (pool, _) = counting_pool(config);
        assert_eq!(pool.poll_interval(), Duration::from_secs(10));

        pool.record_miss();
        pool.record_miss();
        assert_eq!(pool.poll_interval(), Duration::from_secs(40));

        pool.record_miss();
        pool.record_miss();
        assert_eq!(pool.poll_interval(), Duration::from_secs(100));

        pool.record_hit();
        pool.set_focused(false);
        assert_eq!(pool.poll_interval(), Duration::from_secs(60));

        pool.set_push_mode(true);
        assert_eq!(pool.poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_polling_disabled_by_default() {
        let (pool, _) = counting_pool(PoolConfig::default());
        pool.record_miss();
        assert_eq!(pool.poll_interval(), Duration::ZERO);
    }
}
