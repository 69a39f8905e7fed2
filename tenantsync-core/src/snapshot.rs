//! Point-in-time view of a pool's data and freshness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;

// ============================================================================
// Snapshot State
// ============================================================================

/// Freshness state of a [`Snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    /// Nothing fetched yet (or data expired past its stale window).
    #[default]
    Idle,
    /// First fetch in progress, no data to show.
    Loading,
    /// Data within its fresh TTL.
    Fresh,
    /// Data past its fresh TTL, still served while a refresh runs.
    Stale,
    /// Last fetch failed; previous data, if any, is retained.
    Error,
}

impl SnapshotState {
    /// Returns a short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Error => "error",
        }
    }

    /// Data quality score used for navigation telemetry.
    ///
    /// Fresh is satisfying, stale or errored-with-data is tolerable, empty is not.
    pub fn quality(&self, has_data: bool) -> f64 {
        match (self, has_data) {
            (Self::Fresh, true) => 1.0,
            (_, true) => 0.5,
            _ => 0.0,
        }
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable copy of a pool's value and status.
///
/// `has_data` distinguishes "never produced a value" from a default `T`.
/// Errors never destroy previously fetched data: a failed refresh leaves
/// `data` untouched and only moves `state` to [`SnapshotState::Error`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Current data (meaningful only when `has_data`).
    pub data: T,
    /// Whether `data` was ever produced.
    pub has_data: bool,
    /// Freshness state.
    pub state: SnapshotState,
    /// Error from the last failed fetch.
    pub err: Option<FetchError>,
    /// When `data` was last written.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Default> Snapshot<T> {
    /// Creates an idle snapshot with no data.
    pub fn empty() -> Self {
        Self {
            data: T::default(),
            has_data: false,
            state: SnapshotState::Idle,
            err: None,
            fetched_at: None,
        }
    }
}

impl<T> Snapshot<T> {
    /// True when data exists, even if stale or errored.
    pub fn usable(&self) -> bool {
        self.has_data
    }

    /// True when the data needs no refresh.
    pub fn is_fresh(&self) -> bool {
        self.state == SnapshotState::Fresh
    }

    /// True while the first fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.state == SnapshotState::Loading
    }

    /// Returns the data if usable.
    pub fn data(&self) -> Option<&T> {
        self.has_data.then_some(&self.data)
    }

    /// Age of the data, if any was fetched.
    pub fn age(&self) -> Option<chrono::Duration> {
        self.fetched_at.map(|t| Utc::now().signed_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snap: Snapshot<Vec<u32>> = Snapshot::empty();
        assert!(!snap.usable());
        assert!(!snap.is_fresh());
        assert!(!snap.is_loading());
        assert_eq!(snap.state, SnapshotState::Idle);
        assert!(snap.data().is_none());
    }

    #[test]
    fn test_stale_and_error_are_usable() {
        let mut snap = Snapshot {
            data: vec![1, 2],
            has_data: true,
            state: SnapshotState::Stale,
            err: None,
            fetched_at: Some(Utc::now()),
        };
        assert!(snap.usable());
        assert!(!snap.is_fresh());

        snap.state = SnapshotState::Error;
        snap.err = Some(FetchError::Other("boom".into()));
        assert!(snap.usable());
        assert_eq!(snap.data(), Some(&vec![1, 2]));
    }

    #[test]
    fn test_quality_scores() {
        assert!((SnapshotState::Fresh.quality(true) - 1.0).abs() < f64::EPSILON);
        assert!((SnapshotState::Stale.quality(true) - 0.5).abs() < f64::EPSILON);
        assert!((SnapshotState::Error.quality(true) - 0.5).abs() < f64::EPSILON);
        assert!(SnapshotState::Error.quality(false).abs() < f64::EPSILON);
    }
}
