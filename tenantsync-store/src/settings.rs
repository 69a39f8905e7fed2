//! User settings store.
//!
//! Settings are loaded once at startup, handed out by value, and written
//! back explicitly. Subscribers are told about changes through a version
//! counter on a watch channel.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tenantsync_fetch::{HttpConfig, RetryStrategy};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};
use crate::pool::PoolConfig;
use crate::scope::ScopeLevel;

/// Longest TTL or poll interval a preset may carry: one year.
pub const MAX_PRESET_SECS: u64 = 365 * 24 * 60 * 60;

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level used when no `RUST_LOG` is set.
    pub log_level: LogLevel,

    /// Maximum accounts queried at once during fan-out. `None` is unbounded.
    pub fan_out_limit: Option<usize>,

    /// Base URL of the workspace API; account ids are appended.
    pub api_base: String,

    /// URL of the authorization endpoint used for account discovery.
    pub auth_url: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,

    /// Attempts per request, including the first.
    pub max_retries: u32,

    /// Pool timing per scope.
    pub presets: PoolPresets,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            fan_out_limit: None,
            api_base: "https://3.basecampapi.com".to_string(),
            auth_url: "https://launchpad.37signals.com/authorization.json".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            presets: PoolPresets::default(),
        }
    }
}

impl Settings {
    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP backend configuration for `token`.
    pub fn http_config(&self, token: impl Into<String>) -> HttpConfig {
        HttpConfig::new(&self.api_base, &self.auth_url, token)
            .with_timeout(self.request_timeout())
            .with_retry_strategy(RetryStrategy::new(self.max_retries))
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.fan_out_limit == Some(0) {
            return Err(StoreError::Config("fan_out_limit must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(StoreError::Config("max_retries must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(StoreError::Config("request_timeout_secs must be positive".into()));
        }
        for (name, url) in [("api_base", &self.api_base), ("auth_url", &self.auth_url)] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(StoreError::Config(format!("{name} must be an http(s) URL: {url}")));
            }
        }
        for (name, preset) in [
            ("global", self.presets.global),
            ("account", self.presets.account),
            ("project", self.presets.project),
            ("tool", self.presets.tool),
        ] {
            preset.validate(name)?;
        }
        Ok(())
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Informational.
    Info,
    /// Debug.
    Debug,
    /// Everything.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Pool timing in whole seconds, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PoolPreset {
    /// Fresh window. Zero never ages.
    pub fresh_ttl_secs: u64,
    /// Stale window after the fresh one. Zero keeps stale data forever.
    pub stale_ttl_secs: u64,
    /// Poll interval while focused. Zero disables polling.
    pub poll_secs: u64,
    /// Poll interval while blurred.
    pub poll_background_secs: u64,
    /// Miss backoff ceiling.
    pub poll_max_secs: u64,
}

impl PoolPreset {
    /// A preset without polling.
    pub const fn cached(fresh_ttl_secs: u64, stale_ttl_secs: u64) -> Self {
        Self {
            fresh_ttl_secs,
            stale_ttl_secs,
            poll_secs: 0,
            poll_background_secs: 0,
            poll_max_secs: 0,
        }
    }

    fn validate(&self, name: &str) -> Result<(), StoreError> {
        for (field, secs) in [
            ("fresh_ttl_secs", self.fresh_ttl_secs),
            ("stale_ttl_secs", self.stale_ttl_secs),
            ("poll_secs", self.poll_secs),
            ("poll_background_secs", self.poll_background_secs),
            ("poll_max_secs", self.poll_max_secs),
        ] {
            if secs > MAX_PRESET_SECS {
                return Err(StoreError::Config(format!(
                    "presets.{name}.{field} must be at most {MAX_PRESET_SECS}: {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Converts to a [`PoolConfig`].
    pub fn config(&self) -> PoolConfig {
        PoolConfig::new(
            Duration::from_secs(self.fresh_ttl_secs),
            Duration::from_secs(self.stale_ttl_secs),
        )
        .with_polling(
            Duration::from_secs(self.poll_secs),
            Duration::from_secs(self.poll_background_secs),
            Duration::from_secs(self.poll_max_secs),
        )
    }
}

/// One [`PoolPreset`] per scope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolPresets {
    /// Cross-account aggregates.
    pub global: PoolPreset,
    /// Per-account lists.
    pub account: PoolPreset,
    /// Per-project data.
    pub project: PoolPreset,
    /// Per-tool data.
    pub tool: PoolPreset,
}

impl Default for PoolPresets {
    fn default() -> Self {
        Self {
            global: PoolPreset {
                fresh_ttl_secs: 30,
                stale_ttl_secs: 300,
                poll_secs: 30,
                poll_background_secs: 120,
                poll_max_secs: 300,
            },
            account: PoolPreset::cached(60, 600),
            project: PoolPreset::cached(30, 300),
            tool: PoolPreset::cached(30, 300),
        }
    }
}

impl PoolPresets {
    /// The preset for `level`.
    pub fn for_level(&self, level: ScopeLevel) -> PoolPreset {
        match level {
            ScopeLevel::Global => self.global,
            ScopeLevel::Account => self.account,
            ScopeLevel::Project => self.project,
            ScopeLevel::Tool => self.tool,
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Persistent settings with change notifications.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
}

impl SettingsStore {
    /// Creates a store holding defaults, backed by `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
        }
    }

    /// Loads settings from the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads settings from `path`, falling back to defaults when the file is
    /// missing, unparsable, or invalid.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the existence check itself fails.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = if tokio::fs::try_exists(&path).await? {
            info!(path = %path.display(), "Loading settings");
            match load_json::<Settings>(&path).await {
                Ok(settings) => match settings.validate() {
                    Ok(()) => settings,
                    Err(e) => {
                        warn!(error = %e, "Invalid settings, using defaults");
                        Settings::default()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Failed to load settings, using defaults");
                    Settings::default()
                }
            }
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };

        Ok(Self::with_settings(path, settings))
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates settings in memory and notifies subscribers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut *self.settings.write().await);
        self.notify.send_modify(|version| *version += 1);
    }

    /// Restores defaults in memory and notifies subscribers.
    pub async fn reset(&self) {
        self.update(|settings| *settings = Settings::default()).await;
    }

    /// Writes the current settings to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await.clone();
        save_json(&self.path, &settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Subscribes to changes; the value is a change counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
