//! Demo command - a guided walk through the pools.
//!
//! Fetches the global aggregates, drills into one project, completes a
//! to-do optimistically, then switches accounts and shows what survived.

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::json;
use tenantsync_core::{AccountInfo, ActivityEntry, FetchError, PersonInfo, ProjectInfo, Snapshot, TodoInfo};
use tenantsync_fetch::{AccountBackend, MemoryBackend};
use tenantsync_store::{HubEvent, MetricsSummary, PoolStatus, ScopeKey, Session, Settings, timeline_cache_key};
use tracing::{info, warn};

use super::http_backend;
use crate::output::{JsonFormatter, SnapshotOutput, TextFormatter};
use crate::{BackendKind, Cli, OutputFormat};

/// Activity entries shown in text mode.
const ACTIVITY_SHOWN: usize = 8;

/// Arguments for the demo command.
#[derive(Args, Debug, Clone, Default)]
pub struct DemoArgs {
    /// Make every request to this account fail (memory backend).
    #[arg(long)]
    pub fail_account: Option<String>,

    /// Simulated latency per request, in milliseconds (memory backend).
    #[arg(long, default_value = "150")]
    pub latency_ms: u64,
}

/// Everything the walkthrough observed.
#[derive(Debug)]
pub struct DemoReport {
    /// Discovered accounts.
    pub accounts: Vec<AccountInfo>,
    /// Cross-account projects.
    pub projects: Snapshot<Vec<ProjectInfo>>,
    /// Cross-account activity.
    pub activity: Snapshot<Vec<ActivityEntry>>,
    /// Project whose timeline and to-dos were opened.
    pub project: Option<ProjectInfo>,
    /// That project's timeline.
    pub timeline: Snapshot<Vec<ActivityEntry>>,
    /// Whether the timeline came from the warmed cache.
    pub timeline_from_cache: bool,
    /// People in the first account.
    pub people: Snapshot<Vec<PersonInfo>>,
    /// To-dos after the completion settled.
    pub todos: Snapshot<Vec<TodoInfo>>,
    /// Why the completion was rolled back, if it was.
    pub mutation_error: Option<String>,
    /// Account selected at the end.
    pub switched_to: Option<AccountInfo>,
    /// Pool statuses after the switch.
    pub statuses: Vec<PoolStatus>,
    /// Metrics at the end.
    pub summary: MetricsSummary,
}

/// Runs the demo command.
pub async fn run(args: &DemoArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let report = match cli.backend {
        BackendKind::Memory => walkthrough(memory_backend(args), settings).await?,
        BackendKind::Http => {
            if args.fail_account.is_some() {
                warn!("--fail-account only applies to the memory backend");
            }
            walkthrough(http_backend(settings, cli.token.as_deref())?, settings).await?
        }
    };

    match cli.format {
        OutputFormat::Text => print_text(&report, &TextFormatter::new(!cli.no_color)),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(&report_json(&report))?),
    }

    Ok(())
}

/// The seeded backend, with the latency and failure `args` ask for.
pub fn memory_backend(args: &DemoArgs) -> MemoryBackend {
    let backend = MemoryBackend::demo().with_latency(Duration::from_millis(args.latency_ms));
    if let Some(account) = &args.fail_account {
        backend.fail_account(account, FetchError::Transport("simulated outage".into()));
    }
    backend
}

/// Runs every step against `backend` and collects the results.
pub async fn walkthrough<B: AccountBackend>(backend: B, settings: &Settings) -> Result<DemoReport> {
    let session = Session::new(backend, settings);
    let accounts = session.start().await.context("account discovery failed")?;
    let current = session.current_account()?;
    let hub = session.hub();
    let ctx = session.context();
    info!(account = %current, "Demo started");

    let projects = hub.projects()?.fetch_now(&ctx).await;
    hub.record_navigation("projects", &ScopeKey::global("projects"));
    let activity = hub.activity()?.fetch_now(&ctx).await;
    hub.record_navigation("activity", &ScopeKey::global("activity"));

    let project = projects.data.iter().find(|p| p.account_id == current.id).cloned();

    let (timeline, timeline_from_cache, todos, mutation_error) = match &project {
        Some(project) => {
            let timeline_from_cache = session
                .multi()
                .cache()
                .get_typed::<Vec<ActivityEntry>>(&timeline_cache_key(&current.id, project.id))
                .is_some_and(|cached| cached.fresh);
            let timeline = hub
                .project_timeline(&current.id, project.id)?
                .fetch_now(&ctx)
                .await;
            hub.record_navigation("timeline", &ScopeKey::project("timeline", project.id));

            let pool = hub.todos(&current.id, project.id, 1)?;
            let before = pool.pool().fetch_now(&ctx).await;
            let mut mutation_error = None;
            if let Some(open) = before.data.iter().find(|t| !t.completed) {
                let cmd = pool.apply(&ctx, hub.todo_completion(&current.id, project.id, open.id, true))?;
                if let Some(HubEvent::MutationFailed(err)) = cmd.run().await {
                    mutation_error = Some(err.to_string());
                }
            }
            (timeline, timeline_from_cache, pool.get(), mutation_error)
        }
        None => (Snapshot::empty(), false, Snapshot::empty(), None),
    };

    let people = hub.people(&current.id)?.fetch_now(&ctx).await;

    let switched_to = match accounts.iter().find(|a| a.id != current.id) {
        Some(next) => {
            session.switch_account(&next.id)?;
            Some(next.clone())
        }
        None => None,
    };

    let report = DemoReport {
        accounts,
        projects,
        activity,
        project,
        timeline,
        timeline_from_cache,
        people,
        todos,
        mutation_error,
        switched_to,
        statuses: hub.pool_statuses(),
        summary: hub.metrics().summary(),
    };
    session.shutdown();
    Ok(report)
}

fn print_text(report: &DemoReport, fmt: &TextFormatter) {
    println!("{}", fmt.header("Accounts"));
    for (i, account) in report.accounts.iter().enumerate() {
        println!("[{}] {account}", i + 1);
    }
    println!();

    println!("{}", fmt.header("Projects"));
    println!("{}", fmt.format_snapshot_line("projects:global", &report.projects));
    println!("{}", fmt.format_projects(&report.projects.data, &report.accounts));
    println!();

    println!("{}", fmt.header("Activity"));
    println!("{}", fmt.format_snapshot_line("activity:global", &report.activity));
    let shown = report.activity.data.len().min(ACTIVITY_SHOWN);
    println!("{}", fmt.format_activity(&report.activity.data[..shown], &report.accounts));
    println!();

    if let Some(project) = &report.project {
        println!("{}", fmt.header(&project.name));
        let source = if report.timeline_from_cache { "warmed cache" } else { "network" };
        println!("Timeline: {} entries from {source}", report.timeline.data.len());
        println!("{}", fmt.format_todos(&report.todos.data));
        if let Some(err) = &report.mutation_error {
            println!("{}", fmt.format_error("Completion rolled back", err));
        }
        println!();
    }

    println!("People: {}", report.people.data.len());
    if let Some(account) = &report.switched_to {
        println!("Switched to {account}");
    }
    println!();

    println!("{}", fmt.header("Pools"));
    println!("{}", fmt.format_statuses(&report.statuses));
    println!();

    println!("{}", fmt.header("Health"));
    println!("{}", fmt.format_summary(&report.summary));
}

fn report_json(report: &DemoReport) -> serde_json::Value {
    json!({
        "accounts": report.accounts,
        "projects": SnapshotOutput::new("projects:global", &report.projects),
        "activity": SnapshotOutput::new("activity:global", &report.activity),
        "project": report.project,
        "timeline": SnapshotOutput::new("timeline", &report.timeline),
        "timeline_from_cache": report.timeline_from_cache,
        "people": SnapshotOutput::new("people", &report.people),
        "todos": SnapshotOutput::new("todos", &report.todos),
        "mutation_error": report.mutation_error,
        "switched_to": report.switched_to,
        "pools": report.statuses,
        "summary": report.summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(fail_account: Option<&str>) -> MemoryBackend {
        memory_backend(&DemoArgs {
            fail_account: fail_account.map(String::from),
            latency_ms: 0,
        })
    }

    #[tokio::test]
    async fn test_walkthrough_happy_path() {
        let report = walkthrough(backend(None), &Settings::default()).await.unwrap();

        assert_eq!(report.accounts.len(), 3);
        assert_eq!(report.projects.data.len(), 6);
        assert!(report.timeline_from_cache);
        assert!(report.mutation_error.is_none());
        assert_eq!(report.todos.data.iter().filter(|t| t.completed).count(), 2);
        assert_eq!(report.switched_to.as_ref().map(|a| a.id.as_str()), Some("1002"));

        // Only the global pools survive the switch.
        assert!(
            report
                .statuses
                .iter()
                .filter(|s| s.has_data)
                .all(|s| s.key.ends_with(":global"))
        );
    }

    #[tokio::test]
    async fn test_walkthrough_with_failing_account() {
        let report = walkthrough(backend(Some("1002")), &Settings::default()).await.unwrap();

        assert!(report.projects.is_fresh());
        assert_eq!(report.projects.data.len(), 4);
        assert!(report.projects.data.iter().all(|p| p.account_id != "1002"));
    }

    #[tokio::test]
    async fn test_failing_current_account_skips_drill_down() {
        let report = walkthrough(backend(Some("1001")), &Settings::default()).await.unwrap();

        // The first account's projects are missing, so nothing is opened.
        assert!(report.project.is_none());
        assert!(report.people.err.is_some());
    }

    #[test]
    fn test_report_json_shape() {
        let report = DemoReport {
            accounts: vec![AccountInfo::new("1", "One")],
            projects: Snapshot::empty(),
            activity: Snapshot::empty(),
            project: None,
            timeline: Snapshot::empty(),
            timeline_from_cache: false,
            people: Snapshot::empty(),
            todos: Snapshot::empty(),
            mutation_error: None,
            switched_to: None,
            statuses: vec![],
            summary: MetricsSummary {
                active_pools: 0,
                p50_latency: Duration::ZERO,
                error_rate: 0.0,
                apdex: 1.0,
            },
        };
        let value = report_json(&report);
        assert_eq!(value["accounts"][0]["id"], "1");
        assert_eq!(value["projects"]["key"], "projects:global");
        assert!(value["switched_to"].is_null());
    }
}
