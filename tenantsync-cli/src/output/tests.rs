//! CLI output formatting tests.
//!
//! These tests verify that CLI output is correctly formatted for both
//! text and JSON output modes.

#[cfg(test)]
mod text_formatter_tests {
    use super::super::text::TextFormatter;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tenantsync_core::{AccountInfo, ProjectInfo, SnapshotState, TodoInfo};
    use tenantsync_store::{MetricsSummary, PoolStatus};

    fn accounts() -> Vec<AccountInfo> {
        vec![AccountInfo::new("1001", "Acme"), AccountInfo::new("1002", "Globex")]
    }

    fn project(id: u64, account_id: &str) -> ProjectInfo {
        ProjectInfo {
            id,
            name: format!("Project {id}"),
            description: String::new(),
            account_id: account_id.into(),
            account_name: String::new(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_progress_bar_boundary_values() {
        let formatter = TextFormatter::new(false);

        let test_cases = vec![
            (0.0, "░░░░░░░░░░"),
            (10.0, "█░░░░░░░░░"),
            (25.0, "███░░░░░░░"), // 2.5 rounds to 3 blocks
            (50.0, "█████░░░░░"),
            (100.0, "██████████"),
        ];

        for (percent, expected) in test_cases {
            let bar = formatter.progress_bar(percent);
            assert_eq!(bar, expected, "Failed for {}%", percent);
        }
    }

    #[test]
    fn test_progress_bar_with_colors() {
        let formatter = TextFormatter::new(true);
        assert!(formatter.progress_bar(10.0).contains("\x1b[31m"));
        assert!(formatter.progress_bar(50.0).contains("\x1b[33m"));
        assert!(formatter.progress_bar(90.0).contains("\x1b[32m"));
    }

    #[test]
    fn test_state_colors() {
        let formatter = TextFormatter::new(true);
        assert!(formatter.format_state(SnapshotState::Fresh).contains("\x1b[32m"));
        assert!(formatter.format_state(SnapshotState::Stale).contains("\x1b[33m"));
        assert!(formatter.format_state(SnapshotState::Error).contains("\x1b[31m"));
    }

    #[test]
    fn test_projects_carry_account_badges() {
        let formatter = TextFormatter::new(false);
        let output = formatter.format_projects(
            &[project(100, "1001"), project(200, "1002"), project(300, "9999")],
            &accounts(),
        );
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[1] Project 100"));
        assert!(lines[1].starts_with("[2] Project 200"));
        assert!(lines[2].starts_with("[?]"));
    }

    #[test]
    fn test_todos_checklist() {
        let formatter = TextFormatter::new(false);
        let todos = vec![
            TodoInfo {
                id: 1,
                content: "Ship it".into(),
                completed: true,
                due_on: None,
                assignees: vec![],
            },
            TodoInfo {
                id: 2,
                content: "Test it".into(),
                completed: false,
                due_on: None,
                assignees: vec![],
            },
        ];
        assert_eq!(formatter.format_todos(&todos), "[x] Ship it\n[ ] Test it");
    }

    #[test]
    fn test_statuses_show_poll_interval() {
        let formatter = TextFormatter::new(false);
        let statuses = vec![
            PoolStatus {
                key: "projects:global".into(),
                state: SnapshotState::Fresh,
                has_data: true,
                fetched_at: None,
                poll_interval: Duration::from_secs(30),
                hits: 1,
                misses: 0,
                version: 2,
            },
            PoolStatus {
                key: "people:account:1001".into(),
                state: SnapshotState::Idle,
                has_data: false,
                fetched_at: None,
                poll_interval: Duration::ZERO,
                hits: 0,
                misses: 0,
                version: 0,
            },
        ];
        let output = formatter.format_statuses(&statuses);
        assert!(output.contains("projects:global"));
        assert!(output.contains("poll 30s"));
        assert!(output.contains("poll -"));
        assert!(output.contains("never"));
    }

    #[test]
    fn test_summary_lists_apdex() {
        let formatter = TextFormatter::new(false);
        let summary = MetricsSummary {
            active_pools: 3,
            p50_latency: Duration::from_millis(150),
            error_rate: 0.25,
            apdex: 0.5,
        };
        let output = formatter.format_summary(&summary);
        assert!(output.contains("Active pools: 3"));
        assert!(output.contains("150ms"));
        assert!(output.contains("25%"));
        assert!(output.contains("█████░░░░░ 0.50"));
    }
}

#[cfg(test)]
mod json_formatter_tests {
    use super::super::json::JsonFormatter;
    use tenantsync_core::{FetchError, Snapshot, SnapshotState};

    #[test]
    fn test_format_pretty_json() {
        let formatter = JsonFormatter::new(true);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert!(output.contains('\n'));
        assert!(output.contains("\"key\": \"value\""));
    }

    #[test]
    fn test_format_compact_json() {
        let formatter = JsonFormatter::new(false);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert_eq!(output, r#"{"key":"value"}"#);
    }

    #[test]
    fn test_format_empty_snapshot() {
        let formatter = JsonFormatter::new(false);
        let snap: Snapshot<Vec<u32>> = Snapshot::empty();
        let output = formatter.format_snapshot("numbers:global", &snap).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["key"], "numbers:global");
        assert_eq!(parsed["state"], serde_json::to_value(SnapshotState::Idle).unwrap());
        assert_eq!(parsed["data"], serde_json::json!([]));
        assert!(parsed.get("error").is_none());
        assert!(parsed.get("fetched_at").is_none());
    }

    #[test]
    fn test_format_errored_snapshot() {
        let formatter = JsonFormatter::new(false);
        let mut snap: Snapshot<Vec<u32>> = Snapshot::empty();
        snap.state = SnapshotState::Error;
        snap.err = Some(FetchError::Transport("connection reset".into()));
        let output = formatter.format_snapshot("numbers:global", &snap).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("connection reset"));
    }
}
