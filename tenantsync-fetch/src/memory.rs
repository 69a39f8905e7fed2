//! Deterministic in-memory [`AccountBackend`].
//!
//! Backs the CLI demo and the test suites. Every call sleeps for a
//! configurable latency (racing the caller's context) and can be made to fail
//! per account, which is enough to exercise partial fan-out failure,
//! cancellation, and optimistic rollback without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tenantsync_core::{
    AccountInfo, ActivityEntry, FetchError, Identity, PersonInfo, ProjectInfo, TodoInfo,
};
use tracing::debug;

use crate::backend::{AccountBackend, DiscoveredAccount, Discovery, WorkspaceClient};
use crate::context::Context;

// ============================================================================
// Backend
// ============================================================================

/// In-memory backend with latency and failure injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    data: RwLock<MemoryData>,
    calls: AtomicUsize,
}

#[derive(Debug, Default)]
struct MemoryData {
    identity: Identity,
    accounts: Vec<DiscoveredAccount>,
    tenants: HashMap<String, Tenant>,
    latency: Duration,
    account_latency: HashMap<String, Duration>,
    failures: HashMap<String, FetchError>,
}

#[derive(Debug, Default)]
struct Tenant {
    projects: Vec<ProjectInfo>,
    activity: Vec<ActivityEntry>,
    people: Vec<PersonInfo>,
    todos: HashMap<(u64, u64), Vec<TodoInfo>>,
}

impl MemoryBackend {
    /// Creates an empty backend with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with a few accounts, projects and to-dos.
    pub fn demo() -> Self {
        let mut backend = Self::new()
            .with_identity(Identity {
                id: 1,
                first_name: "Demo".into(),
                last_name: "User".into(),
                email_address: "demo@example.com".into(),
            })
            .with_latency(Duration::from_millis(150));

        let seeds = [("1001", "Acme Corp"), ("1002", "Globex"), ("1003", "Initech")];
        let mut next_id = 1u64;
        for (n, (id, name)) in (1u32..).zip(seeds) {
            backend = backend.with_account(AccountInfo::new(id, name));
            for p in 0..2u64 {
                let project_id = u64::from(n) * 100 + p;
                let updated_at = Utc
                    .with_ymd_and_hms(2024, 6, n, 9 + u32::try_from(p).unwrap_or(0), 0, 0)
                    .single()
                    .unwrap_or_default();
                backend = backend.with_project(
                    id,
                    ProjectInfo {
                        id: project_id,
                        name: format!("{name} Project {}", p + 1),
                        description: String::new(),
                        account_id: id.into(),
                        account_name: name.into(),
                        updated_at,
                    },
                );
                for t in 0..3u64 {
                    backend = backend.with_activity(
                        id,
                        ActivityEntry {
                            id: next_id,
                            title: format!("Update {t} on project {project_id}"),
                            kind: "Todo".into(),
                            creator: "Demo User".into(),
                            project_id,
                            account_id: id.into(),
                            updated_at,
                        },
                    );
                    next_id += 1;
                }
                let todos = (0..3u64)
                    .map(|t| TodoInfo {
                        id: project_id * 10 + t,
                        content: format!("Task {}", t + 1),
                        completed: t == 0,
                        due_on: None,
                        assignees: vec!["Demo User".into()],
                    })
                    .collect();
                backend = backend.with_todos(id, project_id, 1, todos);
            }
            backend = backend.with_person(
                id,
                PersonInfo {
                    id: 1,
                    name: "Demo User".into(),
                    email: "demo@example.com".into(),
                    title: String::new(),
                    admin: true,
                },
            );
        }
        backend
    }

    fn write(&self, f: impl FnOnce(&mut MemoryData)) {
        f(&mut self.inner.data.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn read<R>(&self, f: impl FnOnce(&MemoryData) -> R) -> R {
        f(&self.inner.data.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Sets the identity returned by discovery.
    pub fn with_identity(self, identity: Identity) -> Self {
        self.write(|d| d.identity = identity);
        self
    }

    /// Adds an active account.
    pub fn with_account(self, account: AccountInfo) -> Self {
        self.write(|d| {
            d.tenants.entry(account.id.clone()).or_default();
            d.accounts.push(DiscoveredAccount {
                account,
                expired: false,
            });
        });
        self
    }

    /// Adds an expired account; discovery reports it, fan-out never sees it.
    pub fn with_expired_account(self, account: AccountInfo) -> Self {
        self.write(|d| {
            d.accounts.push(DiscoveredAccount {
                account,
                expired: true,
            });
        });
        self
    }

    /// Adds a project to an account.
    pub fn with_project(self, account_id: &str, project: ProjectInfo) -> Self {
        self.write(|d| d.tenants.entry(account_id.into()).or_default().projects.push(project));
        self
    }

    /// Adds an activity entry to an account.
    pub fn with_activity(self, account_id: &str, entry: ActivityEntry) -> Self {
        self.write(|d| d.tenants.entry(account_id.into()).or_default().activity.push(entry));
        self
    }

    /// Adds a person to an account.
    pub fn with_person(self, account_id: &str, person: PersonInfo) -> Self {
        self.write(|d| d.tenants.entry(account_id.into()).or_default().people.push(person));
        self
    }

    /// Sets the to-dos of one to-do list.
    pub fn with_todos(
        self,
        account_id: &str,
        project_id: u64,
        todolist_id: u64,
        todos: Vec<TodoInfo>,
    ) -> Self {
        self.write(|d| {
            d.tenants
                .entry(account_id.into())
                .or_default()
                .todos
                .insert((project_id, todolist_id), todos);
        });
        self
    }

    /// Sets the latency of every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Sets the latency of every call.
    pub fn set_latency(&self, latency: Duration) {
        self.write(|d| d.latency = latency);
    }

    /// Overrides the latency for one account.
    pub fn set_account_latency(&self, account_id: &str, latency: Duration) {
        self.write(|d| {
            d.account_latency.insert(account_id.into(), latency);
        });
    }

    /// Makes every call against `account_id` fail with `error`.
    pub fn fail_account(&self, account_id: &str, error: FetchError) {
        self.write(|d| {
            d.failures.insert(account_id.into(), error);
        });
    }

    /// Clears an injected failure.
    pub fn recover_account(&self, account_id: &str) {
        self.write(|d| {
            d.failures.remove(account_id);
        });
    }

    /// Replaces an account's project list.
    pub fn set_projects(&self, account_id: &str, projects: Vec<ProjectInfo>) {
        self.write(|d| d.tenants.entry(account_id.into()).or_default().projects = projects);
    }

    /// Returns the stored to-dos of one list.
    pub fn todos_of(&self, account_id: &str, project_id: u64, todolist_id: u64) -> Vec<TodoInfo> {
        self.read(|d| {
            d.tenants
                .get(account_id)
                .and_then(|t| t.todos.get(&(project_id, todolist_id)))
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Number of client calls served so far, discovery excluded.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Waits out the configured latency, then applies injected failures.
    async fn simulate(&self, ctx: &Context, account_id: &str, op: &str) -> Result<(), FetchError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.read(|d| d.account_latency.get(account_id).copied().unwrap_or(d.latency));
        debug!(account = account_id, op, latency_ms = latency.as_millis(), "Memory call");

        ctx.run(async {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(())
        })
        .await?;

        match self.read(|d| d.failures.get(account_id).cloned()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn tenant<R>(&self, account_id: &str, f: impl FnOnce(&Tenant) -> R) -> Result<R, FetchError> {
        self.read(|d| {
            d.tenants
                .get(account_id)
                .map(f)
                .ok_or_else(|| FetchError::NotFound(format!("account {account_id}")))
        })
    }
}

#[async_trait]
impl AccountBackend for MemoryBackend {
    type Client = MemoryClient;

    async fn discover(&self, ctx: &Context) -> Result<Discovery, FetchError> {
        ctx.check()?;
        Ok(self.read(|d| Discovery {
            identity: d.identity.clone(),
            accounts: d.accounts.clone(),
        }))
    }

    fn client_for(&self, account_id: &str) -> MemoryClient {
        MemoryClient {
            backend: self.clone(),
            account_id: account_id.to_string(),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Account-bound view of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    backend: MemoryBackend,
    account_id: String,
}

#[async_trait]
impl WorkspaceClient for MemoryClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn projects(&self, ctx: &Context) -> Result<Vec<ProjectInfo>, FetchError> {
        self.backend.simulate(ctx, &self.account_id, "projects").await?;
        self.backend.tenant(&self.account_id, |t| t.projects.clone())
    }

    async fn recent_activity(&self, ctx: &Context) -> Result<Vec<ActivityEntry>, FetchError> {
        self.backend
            .simulate(ctx, &self.account_id, "recent_activity")
            .await?;
        self.backend.tenant(&self.account_id, |t| t.activity.clone())
    }

    async fn project_timeline(
        &self,
        ctx: &Context,
        project_id: u64,
    ) -> Result<Vec<ActivityEntry>, FetchError> {
        self.backend
            .simulate(ctx, &self.account_id, "project_timeline")
            .await?;
        self.backend.tenant(&self.account_id, |t| {
            t.activity
                .iter()
                .filter(|e| e.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    async fn people(&self, ctx: &Context) -> Result<Vec<PersonInfo>, FetchError> {
        self.backend.simulate(ctx, &self.account_id, "people").await?;
        self.backend.tenant(&self.account_id, |t| t.people.clone())
    }

    async fn todos(
        &self,
        ctx: &Context,
        project_id: u64,
        todolist_id: u64,
    ) -> Result<Vec<TodoInfo>, FetchError> {
        self.backend.simulate(ctx, &self.account_id, "todos").await?;
        self.backend
            .tenant(&self.account_id, |t| t.todos.get(&(project_id, todolist_id)).cloned())?
            .ok_or_else(|| FetchError::NotFound(format!("todolist {todolist_id}")))
    }

    async fn set_todo_completed(
        &self,
        ctx: &Context,
        project_id: u64,
        todo_id: u64,
        completed: bool,
    ) -> Result<(), FetchError> {
        self.backend
            .simulate(ctx, &self.account_id, "set_todo_completed")
            .await?;

        let mut data = self
            .backend
            .inner
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let todo = data
            .tenants
            .get_mut(&self.account_id)
            .into_iter()
            .flat_map(|t| t.todos.iter_mut())
            .filter(|((project, _), _)| *project == project_id)
            .flat_map(|(_, todos)| todos.iter_mut())
            .find(|t| t.id == todo_id)
            .ok_or_else(|| FetchError::NotFound(format!("todo {todo_id}")))?;
        todo.completed = completed;
        Ok(())
    }
}
