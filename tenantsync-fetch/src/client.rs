//! reqwest-backed [`AccountBackend`] for the remote workspace API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tenantsync_core::{
    AccountInfo, ActivityEntry, FetchError, Identity, PersonInfo, ProjectInfo, TodoInfo,
};
use tracing::{debug, instrument};
use url::Url;

use crate::backend::{AccountBackend, DiscoveredAccount, Discovery, WorkspaceClient};
use crate::context::Context;
use crate::error::HttpError;
use crate::retry::RetryStrategy;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string for tenantsync.
const USER_AGENT: &str = concat!("tenantsync/", env!("CARGO_PKG_VERSION"));

/// Product filter applied to discovered accounts.
const PRODUCT: &str = "bc3";

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings shared by every account client.
#[derive(Clone)]
pub struct HttpConfig {
    /// API base URL; the account id is appended as the first path segment.
    pub api_base: String,
    /// Authorization (discovery) endpoint.
    pub auth_url: String,
    /// OAuth bearer token.
    pub token: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryStrategy,
}

impl HttpConfig {
    /// Creates a config with default timeout and retry policy.
    pub fn new(
        api_base: impl Into<String>,
        auth_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            auth_url: auth_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryStrategy::default(),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry strategy.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry = strategy;
        self
    }
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("api_base", &self.api_base)
            .field("auth_url", &self.auth_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug)]
struct Transport {
    inner: Client,
    config: HttpConfig,
}

impl Transport {
    async fn send(&self, method: Method, url: &str) -> Result<Response, HttpError> {
        debug!(%method, url = %url, "Sending request");
        let result = self
            .inner
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(HttpError::Timeout(self.config.timeout)),
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        debug!(status = %status, "Response received");
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        Err(HttpError::Status {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }

    /// Sends a request with retries, racing every attempt against `ctx`.
    async fn execute(&self, ctx: &Context, method: Method, url: &str) -> Result<Response, FetchError> {
        self.config
            .retry
            .run(ctx, || {
                let method = method.clone();
                async move {
                    ctx.run(async { self.send(method, url).await.map_err(FetchError::from) })
                        .await
                }
            })
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, ctx: &Context, url: &str) -> Result<T, FetchError> {
        let response = self.execute(ctx, Method::GET, url).await?;
        ctx.run(async {
            response
                .json::<T>()
                .await
                .map_err(|e| FetchError::InvalidResponse(e.to_string()))
        })
        .await
    }
}

// ============================================================================
// Backend
// ============================================================================

/// HTTP backend: discovers accounts and hands out per-account clients.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    transport: Arc<Transport>,
}

impl HttpBackend {
    /// Creates a backend from `config`.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        Url::parse(&config.api_base)?;
        Url::parse(&config.auth_url)?;

        let inner = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            transport: Arc::new(Transport { inner, config }),
        })
    }
}

#[async_trait]
impl AccountBackend for HttpBackend {
    type Client = HttpAccountClient;

    #[instrument(skip(self, ctx))]
    async fn discover(&self, ctx: &Context) -> Result<Discovery, FetchError> {
        let url = self.transport.config.auth_url.clone();
        let info: WireAuthorization = self
            .transport
            .get_json(ctx, &url)
            .await
            .map_err(|e| e.context("discovering accounts"))?;

        let accounts = info
            .accounts
            .into_iter()
            .filter(|a| a.product == PRODUCT)
            .map(|a| DiscoveredAccount {
                account: AccountInfo::new(a.id.to_string(), a.name),
                expired: a.expired,
            })
            .collect();

        Ok(Discovery {
            identity: info.identity,
            accounts,
        })
    }

    fn client_for(&self, account_id: &str) -> HttpAccountClient {
        let base = format!(
            "{}/{}",
            self.transport.config.api_base.trim_end_matches('/'),
            account_id
        );
        HttpAccountClient {
            transport: self.transport.clone(),
            account_id: account_id.to_string(),
            base,
        }
    }
}

// ============================================================================
// Account Client
// ============================================================================

/// HTTP client bound to one account.
#[derive(Debug, Clone)]
pub struct HttpAccountClient {
    transport: Arc<Transport>,
    account_id: String,
    base: String,
}

impl HttpAccountClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn activity(&self, events: Vec<WireEvent>) -> Vec<ActivityEntry> {
        events
            .into_iter()
            .map(|e| ActivityEntry {
                id: e.id,
                title: e.title,
                kind: e.kind,
                creator: e.creator.map(|c| c.name).unwrap_or_default(),
                project_id: e.bucket.map_or(0, |b| b.id),
                account_id: self.account_id.clone(),
                updated_at: e.created_at,
            })
            .collect()
    }
}

#[async_trait]
impl WorkspaceClient for HttpAccountClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn projects(&self, ctx: &Context) -> Result<Vec<ProjectInfo>, FetchError> {
        let projects: Vec<WireProject> = self
            .transport
            .get_json(ctx, &self.url("/projects.json"))
            .await?;
        Ok(projects
            .into_iter()
            .map(|p| ProjectInfo {
                id: p.id,
                name: p.name,
                description: p.description.unwrap_or_default(),
                account_id: self.account_id.clone(),
                account_name: String::new(),
                updated_at: p.updated_at,
            })
            .collect())
    }

    async fn recent_activity(&self, ctx: &Context) -> Result<Vec<ActivityEntry>, FetchError> {
        let events: Vec<WireEvent> = self
            .transport
            .get_json(ctx, &self.url("/reports/progress.json"))
            .await?;
        Ok(self.activity(events))
    }

    async fn project_timeline(
        &self,
        ctx: &Context,
        project_id: u64,
    ) -> Result<Vec<ActivityEntry>, FetchError> {
        let events: Vec<WireEvent> = self
            .transport
            .get_json(ctx, &self.url(&format!("/projects/{project_id}/timeline.json")))
            .await?;
        Ok(self.activity(events))
    }

    async fn people(&self, ctx: &Context) -> Result<Vec<PersonInfo>, FetchError> {
        let people: Vec<WirePerson> = self
            .transport
            .get_json(ctx, &self.url("/people.json"))
            .await?;
        Ok(people
            .into_iter()
            .map(|p| PersonInfo {
                id: p.id,
                name: p.name,
                email: p.email_address,
                title: p.title.unwrap_or_default(),
                admin: p.admin,
            })
            .collect())
    }

    async fn todos(
        &self,
        ctx: &Context,
        project_id: u64,
        todolist_id: u64,
    ) -> Result<Vec<TodoInfo>, FetchError> {
        let path = format!("/buckets/{project_id}/todolists/{todolist_id}/todos.json");
        let todos: Vec<WireTodo> = self.transport.get_json(ctx, &self.url(&path)).await?;
        Ok(todos
            .into_iter()
            .map(|t| TodoInfo {
                id: t.id,
                content: t.content,
                completed: t.completed,
                due_on: t.due_on,
                assignees: t.assignees.into_iter().map(|a| a.name).collect(),
            })
            .collect())
    }

    async fn set_todo_completed(
        &self,
        ctx: &Context,
        project_id: u64,
        todo_id: u64,
        completed: bool,
    ) -> Result<(), FetchError> {
        let url = self.url(&format!("/buckets/{project_id}/todos/{todo_id}/completion.json"));
        let method = if completed { Method::POST } else { Method::DELETE };
        self.transport.execute(ctx, method, &url).await?;
        Ok(())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireAuthorization {
    #[serde(default)]
    identity: Identity,
    #[serde(default)]
    accounts: Vec<WireAccount>,
}

#[derive(Debug, Deserialize)]
struct WireAccount {
    id: u64,
    name: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    expired: bool,
}

#[derive(Debug, Deserialize)]
struct WireProject {
    id: u64,
    name: String,
    description: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    kind: String,
    created_at: DateTime<Utc>,
    creator: Option<WireName>,
    bucket: Option<WireBucket>,
}

#[derive(Debug, Deserialize)]
struct WireName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireBucket {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WirePerson {
    id: u64,
    name: String,
    #[serde(default)]
    email_address: String,
    title: Option<String>,
    #[serde(default)]
    admin: bool,
}

#[derive(Debug, Deserialize)]
struct WireTodo {
    id: u64,
    content: String,
    #[serde(default)]
    completed: bool,
    due_on: Option<String>,
    #[serde(default)]
    assignees: Vec<WireName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new(HttpConfig::new(
            "https://api.example.com/",
            "https://auth.example.com/authorization.json",
            "token",
        ))
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpBackend::new(HttpConfig::new("not a url", "https://x.test", "t"));
        assert!(matches!(result, Err(HttpError::InvalidUrl(_))));
    }

    #[test]
    fn test_client_for_builds_account_base() {
        let client = backend().client_for("42");
        assert_eq!(client.account_id(), "42");
        assert_eq!(
            client.url("/projects.json"),
            "https://api.example.com/42/projects.json"
        );
    }

    #[test]
    fn test_authorization_payload_decodes() {
        let json = r#"{
            "identity": {"id": 7, "first_name": "Ada", "last_name": "L", "email_address": "a@x.test"},
            "accounts": [
                {"id": 1, "name": "Acme", "product": "bc3"},
                {"id": 2, "name": "Legacy", "product": "bcx"},
                {"id": 3, "name": "Lapsed", "product": "bc3", "expired": true}
            ]
        }"#;
        let info: WireAuthorization = serde_json::from_str(json).unwrap();
        assert_eq!(info.identity.id, 7);
        assert_eq!(info.accounts.len(), 3);
        assert!(info.accounts[2].expired);
    }

    #[test]
    fn test_event_maps_to_activity() {
        let json = r#"[{
            "id": 9, "title": "Ship it", "kind": "todo_completed",
            "created_at": "2024-05-01T12:00:00Z",
            "creator": {"name": "Ada"}, "bucket": {"id": 77}
        }]"#;
        let events: Vec<WireEvent> = serde_json::from_str(json).unwrap();
        let entries = backend().client_for("5").activity(events);
        assert_eq!(entries[0].project_id, 77);
        assert_eq!(entries[0].account_id, "5");
        assert_eq!(entries[0].creator, "Ada");
    }
}
