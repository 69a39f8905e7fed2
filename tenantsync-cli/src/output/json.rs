//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tenantsync_core::{Snapshot, SnapshotState};

// ============================================================================
// JSON Output Types
// ============================================================================

/// Serializable view of a pool snapshot.
#[derive(Debug, Serialize)]
pub struct SnapshotOutput<'a, T: Serialize> {
    /// Pool key.
    pub key: &'a str,
    /// Snapshot state.
    pub state: SnapshotState,
    /// When the data was last fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Last fetch error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The data.
    pub data: &'a T,
}

impl<'a, T: Serialize> SnapshotOutput<'a, T> {
    /// Borrows `snap` under `key`.
    pub fn new(key: &'a str, snap: &'a Snapshot<T>) -> Self {
        Self {
            key,
            state: snap.state,
            fetched_at: snap.fetched_at,
            error: snap.err.as_ref().map(ToString::to_string),
            data: &snap.data,
        }
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats one snapshot.
    pub fn format_snapshot<T: Serialize>(&self, key: &str, snap: &Snapshot<T>) -> Result<String> {
        self.format(&SnapshotOutput::new(key, snap))
    }
}
