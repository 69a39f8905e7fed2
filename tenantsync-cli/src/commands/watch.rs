//! Watch command - event-loop driven polling of the global pools.

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tenantsync_core::{ActivityEntry, ProjectInfo};
use tenantsync_fetch::{AccountBackend, Context, MemoryBackend};
use tenantsync_store::{Cmd, HubEvent, Pool, Session, Settings};
use tracing::{debug, info};

use super::http_backend;
use crate::output::{JsonFormatter, SnapshotOutput, TextFormatter};
use crate::{BackendKind, Cli, OutputFormat};

/// Arguments for watch command.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Stop after this many completed polls.
    #[arg(long, short)]
    pub ticks: Option<u32>,

    /// Poll interval for the global pools, in seconds. Defaults to the
    /// configured preset.
    #[arg(long)]
    pub poll_secs: Option<u64>,

    /// Simulated latency per request, in milliseconds (memory backend).
    #[arg(long, default_value = "150")]
    pub latency_ms: u64,
}

/// A polled pool and the poll currently waiting on its fetch.
struct Watched<T> {
    pool: Pool<T>,
    started: Option<PollStart<T>>,
}

/// What the pool held when a poll dispatched its fetch.
struct PollStart<T> {
    version: u64,
    data: T,
}

impl<T> Watched<T>
where
    T: Clone + Default + PartialEq + Send + Sync + 'static,
{
    fn new(pool: Pool<T>) -> Self {
        Self { pool, started: None }
    }

    /// Returns the refresh to dispatch, or `None` when the pool is fresh or
    /// already fetching.
    fn begin(&mut self, ctx: &Context) -> Option<Cmd> {
        let snapshot = self.pool.get();
        let version = self.pool.version();
        let cmd = self.pool.fetch_if_stale(ctx)?;
        self.started = Some(PollStart {
            version,
            data: snapshot.data,
        });
        Some(cmd)
    }

    /// Settles the running poll, if any. `Some(true)` when it brought new data.
    fn settle(&mut self) -> Option<bool> {
        let start = self.started.take()?;
        Some(self.pool.version() != start.version && self.pool.get().data != start.data)
    }
}

/// The pools a watch session keeps refreshed.
pub struct Watcher<B: AccountBackend> {
    session: Session<B>,
    projects: Watched<Vec<ProjectInfo>>,
    activity: Watched<Vec<ActivityEntry>>,
    polls: u32,
}

/// Outcome of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchUpdate {
    /// A pool changed; its key.
    Updated(String),
    /// A poll finished. `hit` is whether it brought new data.
    Polled {
        /// Poll tag.
        tag: String,
        /// New data arrived.
        hit: bool,
        /// Interval until the next poll.
        next: Duration,
    },
    /// A mutation was rolled back.
    Failed(String),
}

impl<B: AccountBackend> Watcher<B> {
    /// Starts a session and schedules the initial fetches and polls.
    pub async fn start(backend: B, settings: &Settings) -> Result<Self> {
        let session = Session::new(backend, settings);
        session.start().await.context("account discovery failed")?;

        let projects = session.hub().projects()?;
        let activity = session.hub().activity()?;
        let ctx = session.context();

        session.dispatch_all([projects.fetch(&ctx), activity.fetch(&ctx)]);
        session.dispatch_all(session.poll(&projects));
        session.dispatch_all(session.poll(&activity));

        Ok(Self {
            session,
            projects: Watched::new(projects),
            activity: Watched::new(activity),
            polls: 0,
        })
    }

    /// The session being driven.
    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    /// Polls completed so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Handles one event from the session's channel.
    ///
    /// Never waits on I/O: a due poll dispatches its fetch and returns, and
    /// the poll is settled when the pool's update comes back through the
    /// channel.
    pub fn handle(&mut self, event: HubEvent) -> Vec<WatchUpdate> {
        match event {
            HubEvent::PoolUpdated { key } => {
                let settled = if key == self.projects.pool.key() {
                    self.projects.settle()
                } else if key == self.activity.pool.key() {
                    self.activity.settle()
                } else {
                    None
                };
                let mut updates = vec![WatchUpdate::Updated(key.clone())];
                if let Some(hit) = settled {
                    updates.extend(self.finish_poll(key, hit));
                }
                updates
            }
            HubEvent::MutationFailed(err) => vec![WatchUpdate::Failed(err.to_string())],
            HubEvent::PollDue { tag } => {
                let ctx = self.session.context();
                let refresh = if tag == self.projects.pool.key() {
                    self.projects.begin(&ctx)
                } else if tag == self.activity.pool.key() {
                    self.activity.begin(&ctx)
                } else {
                    debug!(tag = %tag, "Poll for unknown pool");
                    return Vec::new();
                };
                match refresh {
                    Some(cmd) => {
                        drop(self.session.dispatch(cmd));
                        Vec::new()
                    }
                    None => self.finish_poll(tag, false).into_iter().collect(),
                }
            }
        }
    }

    /// Feeds the outcome to the pool's backoff and schedules the next tick.
    fn finish_poll(&mut self, tag: String, hit: bool) -> Option<WatchUpdate> {
        self.polls += 1;
        let poller = self.session.poller();
        if hit {
            poller.record_hit(&tag);
        } else {
            poller.record_miss(&tag);
        }
        let next = poller.interval(&tag)?;
        self.session
            .dispatch_all(poller.schedule(&tag, &self.session.context()));
        Some(WatchUpdate::Polled { tag, hit, next })
    }

    /// Stops all background work.
    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

/// Runs the watch command.
pub async fn run(args: &WatchArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let mut settings = settings.clone();
    if let Some(secs) = args.poll_secs {
        settings.presets.global.poll_secs = secs;
    }

    match cli.backend {
        BackendKind::Memory => {
            let backend = MemoryBackend::demo().with_latency(Duration::from_millis(args.latency_ms));
            watch(backend, args, &settings, cli).await
        }
        BackendKind::Http => {
            let backend = http_backend(&settings, cli.token.as_deref())?;
            watch(backend, args, &settings, cli).await
        }
    }
}

async fn watch<B: AccountBackend>(backend: B, args: &WatchArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let mut watcher = Watcher::start(backend, settings).await?;
    let mut events = watcher
        .session()
        .take_events()
        .context("event receiver already taken")?;

    info!(poll_secs = settings.presets.global.poll_secs, backend = ?cli.backend, "Starting watch mode");

    let formatter = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(cli.pretty);

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = event else { break };

        for update in watcher.handle(event) {
            match cli.format {
                OutputFormat::Text => println!("{}", render_text(&watcher, &update, &formatter)),
                OutputFormat::Json => {
                    if let WatchUpdate::Updated(key) = &update {
                        if let Some(line) = render_json(&watcher, key, &json)? {
                            println!("{line}");
                        }
                    }
                }
            }
        }

        if args.ticks.is_some_and(|limit| watcher.polls() >= limit) {
            break;
        }
    }

    watcher.shutdown();
    Ok(())
}

fn render_text<B: AccountBackend>(watcher: &Watcher<B>, update: &WatchUpdate, fmt: &TextFormatter) -> String {
    let now = chrono::Local::now().format("%H:%M:%S");
    match update {
        WatchUpdate::Updated(key) if key == watcher.projects.pool.key() => {
            format!("{now} {}", fmt.format_snapshot_line(key, &watcher.projects.pool.get()))
        }
        WatchUpdate::Updated(key) if key == watcher.activity.pool.key() => {
            format!("{now} {}", fmt.format_snapshot_line(key, &watcher.activity.pool.get()))
        }
        WatchUpdate::Updated(key) => format!("{now} {key} updated"),
        WatchUpdate::Polled { tag, hit, next } => {
            let outcome = if *hit { "new data" } else { "no change" };
            format!("{now} poll {tag}: {outcome}, next in {}s", next.as_secs())
        }
        WatchUpdate::Failed(err) => format!("{now} {}", fmt.format_error("Mutation failed", err)),
    }
}

fn render_json<B: AccountBackend>(watcher: &Watcher<B>, key: &str, json: &JsonFormatter) -> Result<Option<String>> {
    if key == watcher.projects.pool.key() {
        let snap = watcher.projects.pool.get();
        return json.format(&SnapshotOutput::new(key, &snap)).map(Some);
    }
    if key == watcher.activity.pool.key() {
        let snap = watcher.activity.pool.get();
        return json.format(&SnapshotOutput::new(key, &snap)).map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(poll_secs: u64) -> Settings {
        let mut settings = Settings::default();
        settings.presets.global.fresh_ttl_secs = poll_secs;
        settings.presets.global.poll_secs = poll_secs;
        settings.presets.global.poll_background_secs = poll_secs;
        settings.presets.global.poll_max_secs = poll_secs * 4;
        settings
    }

    async fn next_poll(
        watcher: &mut Watcher<MemoryBackend>,
        events: &mut tokio::sync::mpsc::UnboundedReceiver<HubEvent>,
        tag: &str,
    ) -> (bool, Duration) {
        loop {
            let event = events.recv().await.unwrap();
            for update in watcher.handle(event) {
                if let WatchUpdate::Polled { tag: t, hit, next } = update {
                    if t == tag {
                        return (hit, next);
                    }
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_fetches_then_polls() {
        let backend = MemoryBackend::demo().with_latency(Duration::ZERO);
        let mut watcher = Watcher::start(backend, &settings(10)).await.unwrap();
        let mut events = watcher.session().take_events().unwrap();

        let mut updated = Vec::new();
        let mut polls = Vec::new();
        while watcher.polls() < 2 {
            let event = events.recv().await.unwrap();
            for update in watcher.handle(event) {
                match update {
                    WatchUpdate::Updated(key) => updated.push(key),
                    WatchUpdate::Polled { tag, hit, .. } => polls.push((tag, hit)),
                    other @ WatchUpdate::Failed(_) => panic!("unexpected update {other:?}"),
                }
            }
        }
        updated.sort();
        updated.dedup();
        assert_eq!(updated, vec!["activity:global", "projects:global"]);

        // Nothing changed on the backend, so both polls are misses.
        assert_eq!(polls.len(), 2);
        assert!(polls.iter().all(|(_, hit)| !hit));
        watcher.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_poll_dispatches_instead_of_awaiting() {
        let backend = MemoryBackend::demo().with_latency(Duration::from_secs(5));
        let mut settings = settings(10);
        settings.presets.global.fresh_ttl_secs = 1;
        let mut watcher = Watcher::start(backend, &settings).await.unwrap();
        let mut events = watcher.session().take_events().unwrap();

        // Drain the initial fetches.
        let mut seen = 0;
        while seen < 2 {
            let event = events.recv().await.unwrap();
            if matches!(event, HubEvent::PoolUpdated { .. }) {
                seen += 1;
            }
        }

        let due = loop {
            let event = events.recv().await.unwrap();
            if matches!(event, HubEvent::PollDue { .. }) {
                break event;
            }
        };
        let started = tokio::time::Instant::now();
        assert!(watcher.handle(due).is_empty());
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(watcher.polls(), 0);

        // The fetch lands later, as its own event, and settles the poll.
        let (hit, _) = next_poll(&mut watcher, &mut events, "projects:global").await;
        assert!(!hit);
        assert!(started.elapsed() >= Duration::from_secs(5));
        watcher.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_backs_off_and_hit_resets() {
        let backend = MemoryBackend::demo().with_latency(Duration::ZERO);
        let mut watcher = Watcher::start(backend.clone(), &settings(10)).await.unwrap();
        let mut events = watcher.session().take_events().unwrap();
        let tag = "projects:global";

        let first = next_poll(&mut watcher, &mut events, tag).await;
        assert_eq!(first, (false, Duration::from_secs(20)));

        backend.set_projects("1001", Vec::new());
        let second = next_poll(&mut watcher, &mut events, tag).await;
        assert_eq!(second, (true, Duration::from_secs(10)));

        // The pool reports the same interval the poller schedules with.
        let status = watcher.session().hub().projects().unwrap().status();
        assert_eq!(status.poll_interval, Duration::from_secs(10));
        assert_eq!((status.hits, status.misses), (1, 1));
        watcher.shutdown();
    }
}
