//! Pool registry.
//!
//! The [`Hub`] creates pools on first use, hands the same instance to every
//! later caller, and manages them by scope: invalidating a level, clearing
//! everything account-specific on a switch, tearing down on shutdown.
//!
//! Typed accessors (`projects`, `activity`, `todos`, ...) wire a pool key to
//! a fetcher over the [`MultiStore`].

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tenantsync_core::{ActivityEntry, FetchError, PersonInfo, ProjectInfo, SnapshotState, TodoInfo};
use tenantsync_fetch::{
    AccountBackend, Context, ContextRoot, FanOutOutcome, FanOutResults, MultiStore, WorkspaceClient,
};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::metrics::{NavigationEvent, PoolMetrics, PoolStatus};
use crate::mutation::{MutatingPool, Mutation, MutationTarget};
use crate::pool::{Pool, Pooler, fetcher};
use crate::scope::{ScopeKey, ScopeLevel};
use crate::settings::PoolPresets;

/// Entries kept in the merged activity feed.
pub const ACTIVITY_LIMIT: usize = 50;

// ============================================================================
// Hub
// ============================================================================

/// Registry of pools for one session. Cheap to clone; clones share state.
pub struct Hub<B: AccountBackend> {
    inner: Arc<HubInner<B>>,
}

struct HubInner<B: AccountBackend> {
    root: Arc<ContextRoot>,
    multi: Arc<MultiStore<B>>,
    pools: Mutex<HashMap<String, PoolEntry>>,
    metrics: Arc<PoolMetrics>,
    presets: PoolPresets,
    current_account: RwLock<Option<String>>,
    /// Account each project- and tool-scoped key fetches through.
    owners: Mutex<HashMap<String, String>>,
}

/// A registered pool, type-erased twice: once for downcasting back to the
/// caller's type, once for uniform lifecycle management.
struct PoolEntry {
    level: ScopeLevel,
    type_name: &'static str,
    any: Arc<dyn Any + Send + Sync>,
    pooler: Arc<dyn Pooler>,
}

impl<B: AccountBackend> Clone for Hub<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AccountBackend> Hub<B> {
    /// Creates an empty registry.
    pub fn new(root: Arc<ContextRoot>, multi: Arc<MultiStore<B>>, presets: PoolPresets) -> Self {
        Self {
            inner: Arc::new(HubInner {
                root,
                multi,
                pools: Mutex::new(HashMap::new()),
                metrics: Arc::new(PoolMetrics::new()),
                presets,
                current_account: RwLock::new(None),
                owners: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Returns the pool registered under `key`, creating it with `make` on
    /// first use. Concurrent first calls get the same instance.
    ///
    /// # Errors
    ///
    /// [`StoreError::PoolTypeMismatch`] if `key` was registered with another
    /// type, [`StoreError::ShutDown`] after [`Hub::shutdown`].
    pub fn resolve<T>(&self, key: &ScopeKey, make: impl FnOnce() -> Pool<T>) -> Result<Pool<T>, StoreError>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        self.resolve_entry(key, || {
            let pool = make();
            pool.attach_metrics(self.inner.metrics.clone());
            let pooler: Arc<dyn Pooler> = Arc::new(pool.clone());
            (pool, pooler)
        })
    }

    /// Like [`Hub::resolve`] for pools that accept mutations.
    ///
    /// # Errors
    ///
    /// Same as [`Hub::resolve`].
    pub fn resolve_mutating<T>(
        &self,
        key: &ScopeKey,
        make: impl FnOnce() -> MutatingPool<T>,
    ) -> Result<MutatingPool<T>, StoreError>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        self.resolve_entry(key, || {
            let pool = make();
            pool.pool().attach_metrics(self.inner.metrics.clone());
            let pooler: Arc<dyn Pooler> = Arc::new(pool.pool().clone());
            (pool, pooler)
        })
    }

    fn resolve_entry<P>(
        &self,
        key: &ScopeKey,
        make: impl FnOnce() -> (P, Arc<dyn Pooler>),
    ) -> Result<P, StoreError>
    where
        P: Clone + Send + Sync + 'static,
    {
        if self.inner.root.is_shut_down() {
            return Err(StoreError::ShutDown);
        }

        let key_str = key.to_string();
        let mut pools = self.pools();
        if let Some(entry) = pools.get(&key_str) {
            return entry
                .any
                .downcast_ref::<P>()
                .cloned()
                .ok_or_else(|| StoreError::PoolTypeMismatch {
                    key: key_str.clone(),
                    existing: entry.type_name,
                    requested: type_name::<P>(),
                });
        }

        let (pool, pooler) = make();
        debug!(key = %key_str, level = %key.level(), "Registered pool");
        pools.insert(
            key_str,
            PoolEntry {
                level: key.level(),
                type_name: type_name::<P>(),
                any: Arc::new(pool.clone()),
                pooler,
            },
        );
        Ok(pool)
    }

    fn pools(&self) -> std::sync::MutexGuard<'_, HashMap<String, PoolEntry>> {
        self.inner.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poolers(&self, filter: impl Fn(ScopeLevel) -> bool) -> Vec<Arc<dyn Pooler>> {
        self.pools()
            .values()
            .filter(|e| filter(e.level))
            .map(|e| e.pooler.clone())
            .collect()
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.pools().len()
    }

    /// Marks every pool at `level` stale.
    pub fn invalidate_scope(&self, level: ScopeLevel) {
        let poolers = self.poolers(|l| l == level);
        debug!(level = %level, pools = poolers.len(), "Invalidating scope");
        for pooler in poolers {
            pooler.invalidate();
        }
    }

    /// Marks every pool stale.
    pub fn invalidate_all(&self) {
        for pooler in self.poolers(|_| true) {
            pooler.invalidate();
        }
    }

    /// Live status of every pool, ordered by key.
    pub fn pool_statuses(&self) -> Vec<PoolStatus> {
        let mut statuses: Vec<_> = self.poolers(|_| true).iter().map(|p| p.status()).collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    /// Records that `view` was shown backed by the pool at `key`.
    pub fn record_navigation(&self, view: &str, key: &ScopeKey) {
        let key = key.to_string();
        let status = self.pools().get(&key).map(|e| e.pooler.status());
        let event = match status {
            Some(s) => NavigationEvent::new(view, key, s.state, s.has_data),
            None => NavigationEvent::new(view, key, SnapshotState::Idle, false),
        };
        self.inner.metrics.record_navigation(event);
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    /// Context for global-scope work.
    pub fn global_context(&self) -> Context {
        self.inner.root.context()
    }

    /// Context for account-scope work.
    pub fn account_context(&self) -> Context {
        self.inner.root.context()
    }

    /// Context for project-scope work.
    pub fn project_context(&self) -> Context {
        self.inner.root.context()
    }

    /// The selected account, if any.
    pub fn current_account(&self) -> Option<String> {
        self.inner
            .current_account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches to `account_id`.
    ///
    /// Cancels every in-flight request, starts a new epoch, and clears all
    /// non-global pools. Global pools keep their data; results of their
    /// cancelled fetches are discarded. Returns the new epoch.
    pub fn switch_account(&self, account_id: &str) -> u64 {
        let previous = self
            .inner
            .current_account
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(account_id.to_string());
        let epoch = self.inner.root.reset_context();

        let cleared = self.poolers(|l| l != ScopeLevel::Global);
        for pooler in &cleared {
            pooler.clear();
        }
        info!(
            from = previous.as_deref().unwrap_or("-"),
            to = account_id,
            epoch,
            cleared = cleared.len(),
            "Switched account"
        );
        epoch
    }

    /// Cancels the root context. Later resolves fail with
    /// [`StoreError::ShutDown`].
    pub fn shutdown(&self) {
        self.inner.root.shutdown();
        info!(pools = self.pool_count(), "Hub shut down");
    }

    /// The shared telemetry sink.
    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.inner.metrics
    }

    /// The account directory.
    pub fn multi(&self) -> &Arc<MultiStore<B>> {
        &self.inner.multi
    }

    /// The session's cancellation root.
    pub fn root(&self) -> &Arc<ContextRoot> {
        &self.inner.root
    }

    /// Timing presets.
    pub fn presets(&self) -> &PoolPresets {
        &self.inner.presets
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    /// Projects across every account, most recently active first.
    ///
    /// # Errors
    ///
    /// See [`Hub::resolve`].
    pub fn projects(&self) -> Result<Pool<Vec<ProjectInfo>>, StoreError> {
        let key = ScopeKey::global("projects");
        let config = self.inner.presets.global.config();
        let multi = self.inner.multi.clone();
        self.resolve(&key, || {
            Pool::new(
                key.to_string(),
                config,
                fetcher(move |ctx| {
                    let multi = multi.clone();
                    async move {
                        let results = multi
                            .fan_out(&ctx, |ctx, _account, client| async move {
                                client.projects(&ctx).await
                            })
                            .await;
                        let mut projects = merge("projects", results)?;
                        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                        Ok::<_, FetchError>(projects)
                    }
                }),
            )
        })
    }

    /// Recent activity across every account, newest first, capped at
    /// [`ACTIVITY_LIMIT`].
    ///
    /// Each fetch also warms the cache with per-project timelines, which
    /// [`Hub::project_timeline`] picks up instead of refetching.
    ///
    /// # Errors
    ///
    /// See [`Hub::resolve`].
    pub fn activity(&self) -> Result<Pool<Vec<ActivityEntry>>, StoreError> {
        let key = ScopeKey::global("activity");
        let config = self.inner.presets.global.config();
        let warm = self.inner.presets.project.config();
        let multi = self.inner.multi.clone();
        self.resolve(&key, || {
            Pool::new(
                key.to_string(),
                config,
                fetcher(move |ctx| {
                    let multi = multi.clone();
                    async move {
                        let warming = multi.clone();
                        let results = multi
                            .fan_out(&ctx, move |ctx, account, client| {
                                let multi = warming.clone();
                                async move {
                                    let entries = client.recent_activity(&ctx).await?;
                                    warm_timelines(&multi, &account.id, &entries, warm.fresh_ttl, warm.stale_ttl);
                                    Ok::<_, FetchError>(entries)
                                }
                            })
                            .await;
                        let mut entries = merge("activity", results)?;
                        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                        entries.truncate(ACTIVITY_LIMIT);
                        Ok::<_, FetchError>(entries)
                    }
                }),
            )
        })
    }

    /// Timeline of one project, newest first.
    ///
    /// A fresh cache entry warmed by [`Hub::activity`] is used when present;
    /// anything else (missing, stale, or of another shape) falls through to
    /// the API.
    ///
    /// The key carries no account: project ids are unique across accounts,
    /// and the pool keeps fetching through the account it was first
    /// resolved for.
    ///
    /// # Errors
    ///
    /// [`StoreError::AccountMismatch`] if the project was already resolved
    /// for another account, otherwise see [`Hub::resolve`].
    pub fn project_timeline(
        &self,
        account_id: &str,
        project_id: u64,
    ) -> Result<Pool<Vec<ActivityEntry>>, StoreError> {
        let key = ScopeKey::project("timeline", project_id);
        self.bind_owner(&key, account_id)?;
        let config = self.inner.presets.project.config();
        let multi = self.inner.multi.clone();
        let account_id = account_id.to_string();
        self.resolve(&key, || {
            Pool::new(
                key.to_string(),
                config,
                fetcher(move |ctx| {
                    let multi = multi.clone();
                    let account_id = account_id.clone();
                    async move {
                        let cache_key = timeline_cache_key(&account_id, project_id);
                        if let Some(cached) = multi.cache().get_typed::<Vec<ActivityEntry>>(&cache_key) {
                            if cached.fresh {
                                debug!(key = %cache_key, "Timeline served from warmed cache");
                                return Ok(cached.value);
                            }
                        }
                        multi
                            .fan_out_single(&ctx, &account_id, |ctx, client| async move {
                                client.project_timeline(&ctx, project_id).await
                            })
                            .await
                    }
                }),
            )
        })
    }

    /// People in one account.
    ///
    /// # Errors
    ///
    /// See [`Hub::resolve`].
    pub fn people(&self, account_id: &str) -> Result<Pool<Vec<PersonInfo>>, StoreError> {
        let key = ScopeKey::account("people", account_id);
        let config = self.inner.presets.account.config();
        let multi = self.inner.multi.clone();
        let account_id = account_id.to_string();
        self.resolve(&key, || {
            Pool::new(
                key.to_string(),
                config,
                fetcher(move |ctx| {
                    let multi = multi.clone();
                    let account_id = account_id.clone();
                    async move {
                        multi
                            .fan_out_single(&ctx, &account_id, |ctx, client| async move {
                                client.people(&ctx).await
                            })
                            .await
                    }
                }),
            )
        })
    }

    /// To-dos of one list. Accepts [`TodoCompletion`] mutations.
    ///
    /// Keyed by project and list id only; see [`Hub::project_timeline`].
    ///
    /// # Errors
    ///
    /// [`StoreError::AccountMismatch`] if the list was already resolved for
    /// another account, otherwise see [`Hub::resolve`].
    pub fn todos(
        &self,
        account_id: &str,
        project_id: u64,
        todolist_id: u64,
    ) -> Result<MutatingPool<Vec<TodoInfo>>, StoreError> {
        let key = ScopeKey::tool("todos", project_id, todolist_id);
        self.bind_owner(&key, account_id)?;
        let config = self.inner.presets.tool.config();
        let multi = self.inner.multi.clone();
        let account_id = account_id.to_string();
        self.resolve_mutating(&key, || {
            MutatingPool::new(
                key.to_string(),
                config,
                fetcher(move |ctx| {
                    let multi = multi.clone();
                    let account_id = account_id.clone();
                    async move {
                        multi
                            .fan_out_single(&ctx, &account_id, |ctx, client| async move {
                                client.todos(&ctx, project_id, todolist_id).await
                            })
                            .await
                    }
                }),
            )
        })
    }

    /// Records `account_id` as the owner of `key`, or checks it against the
    /// owner recorded earlier.
    fn bind_owner(&self, key: &ScopeKey, account_id: &str) -> Result<(), StoreError> {
        let mut owners = self.inner.owners.lock().unwrap_or_else(PoisonError::into_inner);
        let owner = owners
            .entry(key.to_string())
            .or_insert_with(|| account_id.to_string());
        if owner.as_str() == account_id {
            return Ok(());
        }
        warn!(key = %key, bound = %owner, requested = %account_id, "Pool resolved for another account");
        Err(StoreError::AccountMismatch {
            key: key.to_string(),
            bound: owner.clone(),
            requested: account_id.to_string(),
        })
    }

    /// Builds the mutation that marks a to-do done (or not done).
    pub fn todo_completion(
        &self,
        account_id: &str,
        project_id: u64,
        todo_id: u64,
        completed: bool,
    ) -> TodoCompletion<B::Client> {
        TodoCompletion {
            client: self.inner.multi.client_for(account_id),
            project_id,
            todo_id,
            completed,
        }
    }
}

impl<B: AccountBackend> fmt::Debug for Hub<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("pools", &self.pool_count())
            .field("current_account", &self.current_account())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Cache key of a warmed project timeline.
pub fn timeline_cache_key(account_id: &str, project_id: u64) -> String {
    format!("timeline:{account_id}:{project_id}")
}

fn warm_timelines<B: AccountBackend>(
    multi: &MultiStore<B>,
    account_id: &str,
    entries: &[ActivityEntry],
    ttl: Duration,
    stale_ttl: Duration,
) {
    let mut by_project: HashMap<u64, Vec<ActivityEntry>> = HashMap::new();
    for entry in entries {
        by_project.entry(entry.project_id).or_default().push(entry.clone());
    }
    for (project_id, mut timeline) in by_project {
        timeline.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        multi
            .cache()
            .set(timeline_cache_key(account_id, project_id), timeline, ttl, stale_ttl);
    }
}

/// Flattens per-account lists, logging partial failures.
fn merge<T>(what: &str, results: FanOutResults<Vec<T>>) -> Result<Vec<T>, FetchError> {
    if let FanOutOutcome::Partial { failed } = results.outcome() {
        for r in results.iter().filter(|r| r.result.is_err()) {
            if let Err(e) = &r.result {
                warn!(resource = what, account = %r.account.id, error = %e, "Account failed");
            }
        }
        warn!(resource = what, failed, total = results.len(), "Partial fan-out");
    }
    Ok(results
        .into_result()?
        .into_iter()
        .filter_map(|r| r.result.ok())
        .flatten()
        .collect())
}

// ============================================================================
// Todo Completion
// ============================================================================

/// Marks a to-do complete or incomplete.
pub struct TodoCompletion<C> {
    client: Arc<C>,
    project_id: u64,
    todo_id: u64,
    completed: bool,
}

impl<C: WorkspaceClient> Mutation<Vec<TodoInfo>> for TodoCompletion<C> {
    fn describe(&self) -> MutationTarget {
        let action = if self.completed { "complete" } else { "uncomplete" };
        MutationTarget::new(action, "todo").with_id(self.todo_id)
    }

    fn apply_optimistic(&self, current: &Vec<TodoInfo>) -> Vec<TodoInfo> {
        current
            .iter()
            .map(|todo| {
                let mut todo = todo.clone();
                if todo.id == self.todo_id {
                    todo.completed = self.completed;
                }
                todo
            })
            .collect()
    }

    fn is_reflected_in(&self, remote: &Vec<TodoInfo>) -> bool {
        remote
            .iter()
            .any(|todo| todo.id == self.todo_id && todo.completed == self.completed)
    }

    async fn commit(&self, ctx: &Context) -> Result<(), FetchError> {
        self.client
            .set_todo_completed(ctx, self.project_id, self.todo_id, self.completed)
            .await
    }
}

impl<C> fmt::Debug for TodoCompletion<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoCompletion")
            .field("project_id", &self.project_id)
            .field("todo_id", &self.todo_id)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use tenantsync_fetch::MemoryBackend;

    fn hub() -> Hub<MemoryBackend> {
        let multi = Arc::new(MultiStore::new(MemoryBackend::demo().with_latency(Duration::ZERO)));
        Hub::new(Arc::new(ContextRoot::new()), multi, PoolPresets::default())
    }

    #[test]
    fn test_resolve_returns_same_instance() {
        let hub = hub();
        let key = ScopeKey::global("numbers");
        let a = hub
            .resolve(&key, || {
                Pool::<Vec<u32>>::new("numbers:global", PoolConfig::default(), fetcher(|_| async { Ok(vec![1]) }))
            })
            .unwrap();
        let b = hub
            .resolve::<Vec<u32>>(&key, || unreachable!("pool already registered"))
            .unwrap();

        a.set(vec![42]);
        assert_eq!(b.get().data, vec![42]);
        assert_eq!(hub.pool_count(), 1);
    }

    #[test]
    fn test_resolve_type_mismatch() {
        let hub = hub();
        let key = ScopeKey::global("numbers");
        hub.resolve(&key, || {
            Pool::<Vec<u32>>::new("numbers:global", PoolConfig::default(), fetcher(|_| async { Ok(vec![]) }))
        })
        .unwrap();

        let err = hub
            .resolve(&key, || {
                Pool::<String>::new("numbers:global", PoolConfig::default(), fetcher(|_| async { Ok(String::new()) }))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::PoolTypeMismatch { .. }));
    }

    #[test]
    fn test_resolve_after_shutdown() {
        let hub = hub();
        hub.shutdown();
        assert!(matches!(hub.projects(), Err(StoreError::ShutDown)));
    }

    #[test]
    fn test_project_pools_stay_with_their_account() {
        let hub = hub();
        let todos = hub.todos("1001", 100, 1).unwrap();
        todos.set(Vec::new());

        let err = hub.todos("1002", 100, 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::AccountMismatch { ref bound, ref requested, .. } if bound == "1001" && requested == "1002"
        ));
        assert!(hub.project_timeline("1001", 100).is_ok());
        assert!(matches!(
            hub.project_timeline("1002", 100),
            Err(StoreError::AccountMismatch { .. })
        ));

        // The owner resolves the same pool as before.
        assert!(hub.todos("1001", 100, 1).unwrap().get().usable());
    }

    #[tokio::test]
    async fn test_projects_merged_newest_first() {
        let hub = hub();
        hub.multi().discover_accounts(&Context::background()).await.unwrap();

        let pool = hub.projects().unwrap();
        let snap = pool.fetch_now(&hub.global_context()).await;
        assert!(snap.is_fresh());
        assert_eq!(snap.data.len(), 6);
        assert!(snap.data.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
    }

    #[tokio::test]
    async fn test_activity_warms_timeline_cache() {
        let hub = hub();
        hub.multi().discover_accounts(&Context::background()).await.unwrap();

        let snap = hub.activity().unwrap().fetch_now(&hub.global_context()).await;
        assert_eq!(snap.data.len(), 18);
        let before = hub.multi().backend().calls();

        let timeline = hub.project_timeline("1001", 100).unwrap();
        let snap = timeline.fetch_now(&hub.project_context()).await;
        assert_eq!(snap.data.len(), 3);
        assert_eq!(hub.multi().backend().calls(), before);
    }

    #[tokio::test]
    async fn test_timeline_falls_through_on_shape_mismatch() {
        let hub = hub();
        hub.multi().discover_accounts(&Context::background()).await.unwrap();
        hub.multi().cache().set(
            timeline_cache_key("1001", 100),
            "not a timeline".to_string(),
            Duration::from_secs(60),
            Duration::ZERO,
        );

        let before = hub.multi().backend().calls();
        let snap = hub.project_timeline("1001", 100).unwrap().fetch_now(&hub.project_context()).await;
        assert!(snap.is_fresh());
        assert_eq!(hub.multi().backend().calls(), before + 1);
    }

    #[tokio::test]
    async fn test_todo_completion_commits() {
        let hub = hub();
        let todos = hub.todos("1001", 100, 1).unwrap();
        let ctx = hub.account_context();
        let snap = todos.pool().fetch_now(&ctx).await;
        let open = snap.data.iter().find(|t| !t.completed).unwrap().id;

        let cmd = todos
            .apply(&ctx, hub.todo_completion("1001", 100, open, true))
            .unwrap();
        assert!(todos.get().data.iter().any(|t| t.id == open && t.completed));

        cmd.run().await;
        let remote = hub.multi().backend().todos_of("1001", 100, 1);
        assert!(remote.iter().any(|t| t.id == open && t.completed));
    }

    #[tokio::test]
    async fn test_switch_account_clears_non_global() {
        let hub = hub();
        let ctx = hub.global_context();
        let projects = hub.projects().unwrap();
        projects.set(Vec::new());
        let people = hub.people("1001").unwrap();
        people.set(Vec::new());

        let epoch = hub.switch_account("1002");
        assert_eq!(epoch, 1);
        assert!(ctx.is_cancelled());
        assert_eq!(hub.current_account().as_deref(), Some("1002"));
        assert!(projects.get().usable());
        assert_eq!(people.get().state, SnapshotState::Idle);
    }

    #[test]
    fn test_invalidate_scope() {
        let hub = hub();
        let projects = hub.projects().unwrap();
        projects.set(Vec::new());
        let people = hub.people("1001").unwrap();
        people.set(Vec::new());

        hub.invalidate_scope(ScopeLevel::Account);
        assert!(projects.get().is_fresh());
        assert_eq!(people.get().state, SnapshotState::Stale);

        hub.invalidate_all();
        assert_eq!(projects.get().state, SnapshotState::Stale);
    }

    #[test]
    fn test_navigation_feeds_apdex() {
        let hub = hub();
        hub.projects().unwrap().set(Vec::new());
        hub.record_navigation("Projects", &ScopeKey::global("projects"));
        hub.record_navigation("People", &ScopeKey::account("people", "1001"));
        assert!((hub.metrics().apdex() - 0.5).abs() < f64::EPSILON);
    }
}
