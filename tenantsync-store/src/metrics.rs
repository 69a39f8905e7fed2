//! Pool fetch telemetry.
//!
//! Every pool the hub creates reports fetch starts, completions, and errors
//! here. The aggregate feeds a status line: active pools, p50 latency, error
//! rate, and an Apdex-style score of how often navigation landed on fresh
//! data.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tenantsync_core::SnapshotState;

/// Events kept for latency and error-rate calculations.
const MAX_EVENTS: usize = 100;

/// Navigations kept for the Apdex score.
const MAX_NAVIGATIONS: usize = 20;

/// Completed fetches sampled for the p50 latency.
const LATENCY_SAMPLE: usize = 50;

// ============================================================================
// Types
// ============================================================================

/// Kind of pool fetch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolEventKind {
    /// A fetch began.
    FetchStart,
    /// A fetch produced data.
    FetchComplete,
    /// A fetch failed.
    FetchError,
}

/// One recorded fetch event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEvent {
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Pool key.
    pub key: String,
    /// What happened.
    pub kind: PoolEventKind,
    /// Fetch duration (zero for starts).
    pub duration: Duration,
}

/// Aggregate counters for one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Finished fetches.
    pub fetch_count: u64,
    /// Failed fetches.
    pub error_count: u64,
    /// Sum of fetch durations.
    pub total_time: Duration,
    /// Last finished fetch.
    pub last_fetch: Option<DateTime<Utc>>,
}

impl PoolStats {
    /// Mean fetch duration.
    pub fn avg_latency(&self) -> Duration {
        match u32::try_from(self.fetch_count) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total_time / n,
        }
    }
}

/// A view navigation together with the quality of the data it showed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationEvent {
    /// When it happened.
    pub at: DateTime<Utc>,
    /// View title.
    pub view: String,
    /// Pool backing the view.
    pub key: String,
    /// 1.0 fresh, 0.5 stale, 0.0 empty.
    pub quality: f64,
}

impl NavigationEvent {
    /// Records a navigation to `view` that found its pool in `state`.
    pub fn new(view: impl Into<String>, key: impl Into<String>, state: SnapshotState, has_data: bool) -> Self {
        Self {
            at: Utc::now(),
            view: view.into(),
            key: key.into(),
            quality: state.quality(has_data),
        }
    }
}

/// Point-in-time health summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Pools that have finished at least one fetch.
    pub active_pools: usize,
    /// Median latency of recent successful fetches.
    pub p50_latency: Duration,
    /// Share of recent finished fetches that failed.
    pub error_rate: f64,
    /// Mean navigation quality.
    pub apdex: f64,
}

/// Live status of one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    /// Pool key.
    pub key: String,
    /// Current (aged) state.
    pub state: SnapshotState,
    /// Whether the pool holds data.
    pub has_data: bool,
    /// Last successful fetch.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Recommended poll interval.
    pub poll_interval: Duration,
    /// Poll hits.
    pub hits: u64,
    /// Poll misses.
    pub misses: u64,
    /// Data version.
    pub version: u64,
}

// ============================================================================
// Pool Metrics
// ============================================================================

/// Collects pool fetch telemetry.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    state: Mutex<MetricsState>,
}

#[derive(Debug, Default)]
struct MetricsState {
    events: VecDeque<PoolEvent>,
    stats: HashMap<String, PoolStats>,
    navigations: VecDeque<NavigationEvent>,
}

impl PoolMetrics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fetch event.
    pub fn record(&self, key: &str, kind: PoolEventKind, duration: Duration) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.events.len() >= MAX_EVENTS {
            state.events.pop_front();
        }
        state.events.push_back(PoolEvent {
            at: now,
            key: key.to_string(),
            kind,
            duration,
        });

        if kind != PoolEventKind::FetchStart {
            let stats = state.stats.entry(key.to_string()).or_default();
            stats.fetch_count += 1;
            stats.total_time += duration;
            stats.last_fetch = Some(now);
            if kind == PoolEventKind::FetchError {
                stats.error_count += 1;
            }
        }
    }

    /// Records a view navigation.
    pub fn record_navigation(&self, event: NavigationEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.navigations.len() >= MAX_NAVIGATIONS {
            state.navigations.pop_front();
        }
        state.navigations.push_back(event);
    }

    /// Returns the counters for one pool.
    pub fn stats(&self, key: &str) -> Option<PoolStats> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .get(key)
            .cloned()
    }

    /// Returns the most recent events, oldest first.
    pub fn recent_events(&self) -> Vec<PoolEvent> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .iter()
            .cloned()
            .collect()
    }

    /// Mean navigation quality; 1.0 when nothing has been recorded.
    pub fn apdex(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apdex(&state.navigations)
    }

    /// Aggregates recent activity.
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> MetricsSummary {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut latencies = Vec::new();
        let mut errors = 0usize;
        let mut total = 0usize;
        for event in state.events.iter().rev() {
            if latencies.len() >= LATENCY_SAMPLE {
                break;
            }
            match event.kind {
                PoolEventKind::FetchComplete => {
                    latencies.push(event.duration);
                    total += 1;
                }
                PoolEventKind::FetchError => {
                    errors += 1;
                    total += 1;
                }
                PoolEventKind::FetchStart => {}
            }
        }
        latencies.sort_unstable();

        MetricsSummary {
            active_pools: state.stats.len(),
            p50_latency: latencies.get(latencies.len() / 2).copied().unwrap_or_default(),
            error_rate: if total == 0 {
                0.0
            } else {
                errors as f64 / total as f64
            },
            apdex: apdex(&state.navigations),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn apdex(navigations: &VecDeque<NavigationEvent>) -> f64 {
    if navigations.is_empty() {
        return 1.0;
    }
    navigations.iter().map(|n| n.quality).sum::<f64>() / navigations.len() as f64
}
