//! Text output formatting with colors.

use chrono::{DateTime, Utc};
use tenantsync_core::{AccountInfo, ActivityEntry, ProjectInfo, Snapshot, SnapshotState, TodoInfo};
use tenantsync_store::{MetricsSummary, PoolStatus};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

// Progress bar characters
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            bar_width: 10,
        }
    }

    /// Section header.
    pub fn header(&self, title: &str) -> String {
        format!("{}\n{}", self.bold(title), "─".repeat(50))
    }

    /// Snapshot state label, colored by quality.
    pub fn format_state(&self, state: SnapshotState) -> String {
        let label = format!("{:<7}", state.label());
        match state {
            SnapshotState::Fresh => self.paint(GREEN, &label),
            SnapshotState::Stale => self.paint(YELLOW, &label),
            SnapshotState::Error => self.paint(RED, &label),
            SnapshotState::Loading => self.paint(BLUE, &label),
            SnapshotState::Idle => self.paint(DIM, &label),
        }
    }

    /// One-line snapshot summary: state, age, item count, error.
    pub fn format_snapshot_line<T>(&self, name: &str, snap: &Snapshot<Vec<T>>) -> String {
        let mut line = format!(
            "{:<24} {} {:>4} items  {}",
            name,
            self.format_state(snap.state),
            snap.data.len(),
            self.dim(&format_age(snap.fetched_at)),
        );
        if let Some(err) = &snap.err {
            line.push_str(&format!("  {}", self.red(&err.to_string())));
        }
        line
    }

    /// Projects with 1-based account badges.
    pub fn format_projects(&self, projects: &[ProjectInfo], accounts: &[AccountInfo]) -> String {
        projects
            .iter()
            .map(|p| {
                format!(
                    "{} {:<32} {}",
                    self.badge(accounts, &p.account_id),
                    p.name,
                    self.dim(&p.updated_at.format("%Y-%m-%d %H:%M").to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Activity feed entries with account badges.
    pub fn format_activity(&self, entries: &[ActivityEntry], accounts: &[AccountInfo]) -> String {
        entries
            .iter()
            .map(|e| {
                format!(
                    "{} {:<8} {} {}",
                    self.badge(accounts, &e.account_id),
                    e.kind,
                    e.title,
                    self.dim(&format!("by {}", e.creator))
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// To-do checklist.
    pub fn format_todos(&self, todos: &[TodoInfo]) -> String {
        todos
            .iter()
            .map(|t| {
                if t.completed {
                    format!("{} {}", self.green("[x]"), self.dim(&t.content))
                } else {
                    format!("[ ] {}", t.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Pool status table.
    pub fn format_statuses(&self, statuses: &[PoolStatus]) -> String {
        statuses
            .iter()
            .map(|s| {
                let poll = if s.poll_interval.is_zero() {
                    "-".to_string()
                } else {
                    format!("{}s", s.poll_interval.as_secs())
                };
                format!(
                    "{:<24} {} v{:<3} poll {:<5} {}",
                    s.key,
                    self.format_state(s.state),
                    s.version,
                    poll,
                    self.dim(&format_age(s.fetched_at)),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Metrics summary with an Apdex bar.
    pub fn format_summary(&self, summary: &MetricsSummary) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Active pools: {}", summary.active_pools));
        lines.push(format!("p50 latency:  {}ms", summary.p50_latency.as_millis()));
        lines.push(format!(
            "Error rate:   {}",
            self.color_for_percent(100.0 - summary.error_rate * 100.0, &format!("{:.0}%", summary.error_rate * 100.0))
        ));
        lines.push(format!(
            "Apdex:        {} {:.2}",
            self.progress_bar(summary.apdex * 100.0),
            summary.apdex
        ));
        lines.join("\n")
    }

    /// Formats an error line.
    pub fn format_error(&self, context: &str, error: &str) -> String {
        format!("{}: {}", self.bold(context), self.red(error))
    }

    /// Formats a progress bar.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn progress_bar(&self, percent: f64) -> String {
        let percent = percent.clamp(0.0, 100.0);
        let filled = ((percent / 100.0) * self.bar_width as f64).round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );

        self.color_for_percent(percent, &bar)
    }

    fn badge(&self, accounts: &[AccountInfo], account_id: &str) -> String {
        let badge = accounts
            .iter()
            .position(|a| a.id == account_id)
            .map_or_else(|| "[?]".to_string(), |i| format!("[{}]", i + 1));
        self.paint(CYAN, &badge)
    }

    fn color_for_percent(&self, percent: f64, text: &str) -> String {
        if percent >= 75.0 {
            self.green(text)
        } else if percent >= 40.0 {
            self.paint(YELLOW, text)
        } else {
            self.red(text)
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }
}

/// Relative age of a fetch time.
pub fn format_age(fetched_at: Option<DateTime<Utc>>) -> String {
    let Some(at) = fetched_at else {
        return "never".to_string();
    };
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}
