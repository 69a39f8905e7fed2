//! Adaptive polling.
//!
//! Each channel is identified by a tag (usually a pool key) and ticks on the
//! interval its source recommends. A tick is a [`Cmd`] that sleeps and then
//! emits [`HubEvent::PollDue`]; the event loop refreshes the matching pool,
//! reports a hit or miss, and schedules the next tick.
//!
//! The poller keeps no backoff state of its own. Misses, focus and push mode
//! live in the source, so a pool's status and its tick schedule always agree.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tenantsync_core::FetchError;
use tenantsync_fetch::Context;
use tracing::trace;

use crate::event::{Cmd, HubEvent};
use crate::pool::Pool;

/// Something that can be polled: reports its interval and takes feedback.
pub trait PollSource: Send + Sync {
    /// Interval until the next poll. Zero disables polling.
    fn poll_interval(&self) -> Duration;
    /// The last poll brought new data.
    fn record_hit(&self);
    /// The last poll brought nothing new.
    fn record_miss(&self);
    /// Focus changed.
    fn set_focused(&self, focused: bool);
}

impl<T> PollSource for Pool<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn poll_interval(&self) -> Duration {
        Pool::poll_interval(self)
    }

    fn record_hit(&self) {
        Pool::record_hit(self);
    }

    fn record_miss(&self) {
        Pool::record_miss(self);
    }

    fn set_focused(&self, focused: bool) {
        Pool::set_focused(self, focused);
    }
}

/// Coordinates polling for any number of channels.
#[derive(Default)]
pub struct Poller {
    channels: Mutex<HashMap<String, Arc<dyn PollSource>>>,
}

impl Poller {
    /// Creates a poller with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` under `tag`, replacing any channel with that tag.
    pub fn add(&self, tag: impl Into<String>, source: Arc<dyn PollSource>) {
        self.lock().insert(tag.into(), source);
    }

    /// Removes a channel. Ticks already scheduled still fire.
    pub fn remove(&self, tag: &str) {
        self.lock().remove(tag);
    }

    /// Registered tags.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.lock().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// First tick for every channel.
    pub fn start(&self, ctx: &Context) -> Vec<Cmd> {
        self.tags()
            .iter()
            .filter_map(|tag| self.schedule(tag, ctx))
            .collect()
    }

    /// Next tick for `tag`, or `None` if no such channel exists or its
    /// source has polling disabled.
    ///
    /// The tick is silent if `ctx` is cancelled before it fires.
    pub fn schedule(&self, tag: &str, ctx: &Context) -> Option<Cmd> {
        let interval = self.interval(tag).filter(|i| !i.is_zero())?;
        let tag = tag.to_string();
        let ctx = ctx.clone();
        trace!(tag = %tag, interval_ms = interval.as_millis(), "Scheduling poll");
        Some(Cmd::new(async move {
            ctx.run(async {
                tokio::time::sleep(interval).await;
                Ok::<_, FetchError>(())
            })
            .await
            .ok()?;
            Some(HubEvent::PollDue { tag })
        }))
    }

    /// Current interval for `tag`.
    pub fn interval(&self, tag: &str) -> Option<Duration> {
        self.source(tag).map(|s| s.poll_interval())
    }

    /// Reports a poll that brought new data to the source behind `tag`.
    pub fn record_hit(&self, tag: &str) {
        if let Some(source) = self.source(tag) {
            source.record_hit();
        }
    }

    /// Reports a poll that brought nothing new to the source behind `tag`.
    pub fn record_miss(&self, tag: &str) {
        if let Some(source) = self.source(tag) {
            source.record_miss();
        }
    }

    /// Forwards a focus change to the source behind `tag`.
    pub fn set_focused(&self, tag: &str, focused: bool) {
        if let Some(source) = self.source(tag) {
            source.set_focused(focused);
        }
    }

    fn source(&self, tag: &str) -> Option<Arc<dyn PollSource>> {
        self.lock().get(tag).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn PollSource>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller").field("tags", &self.tags()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolConfig, fetcher};

    const TAG: &str = "activity:global";

    fn polled_pool() -> Pool<Vec<u32>> {
        let config = PoolConfig::default().with_polling(
            Duration::from_secs(30),
            Duration::from_secs(120),
            Duration::from_secs(300),
        );
        Pool::new(TAG, config, fetcher(|_ctx| async { Ok(vec![1]) }))
    }

    fn poller_with(pool: &Pool<Vec<u32>>) -> Poller {
        let poller = Poller::new();
        poller.add(TAG, Arc::new(pool.clone()));
        poller
    }

    #[test]
    fn test_backoff_lives_in_the_pool() {
        let pool = polled_pool();
        let poller = poller_with(&pool);

        poller.record_miss(TAG);
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(60)));
        assert_eq!(pool.poll_interval(), Duration::from_secs(60));

        for _ in 0..3 {
            poller.record_miss(TAG);
        }
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(300)));
        assert_eq!(pool.status().poll_interval, Duration::from_secs(300));
        assert_eq!(pool.status().misses, 4);

        poller.record_hit(TAG);
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(30)));
        assert_eq!(pool.status().hits, 1);
    }

    #[test]
    fn test_pool_feedback_is_seen_by_poller() {
        let pool = polled_pool();
        let poller = poller_with(&pool);

        pool.record_miss();
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_focus_changes() {
        let pool = polled_pool();
        let poller = poller_with(&pool);

        poller.set_focused(TAG, false);
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(120)));
        poller.record_hit(TAG);
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(120)));
        poller.set_focused(TAG, true);
        assert_eq!(poller.interval(TAG), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_tag() {
        let poller = Poller::new();
        poller.record_miss("nope");
        assert!(poller.interval("nope").is_none());
        assert!(poller.schedule("nope", &Context::background()).is_none());
    }

    #[test]
    fn test_polling_disabled_source_never_ticks() {
        let pool = Pool::new(TAG, PoolConfig::default(), fetcher(|_ctx| async { Ok(vec![1u32]) }));
        let poller = Poller::new();
        poller.add(TAG, Arc::new(pool));
        assert!(poller.schedule(TAG, &Context::background()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_emits_poll_due() {
        let poller = poller_with(&polled_pool());
        let cmds = poller.start(&Context::background());
        assert_eq!(cmds.len(), 1);

        let event = cmds.into_iter().next().unwrap().run().await;
        assert_eq!(event, Some(HubEvent::PollDue { tag: TAG.into() }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_tick_is_silent() {
        let poller = poller_with(&polled_pool());
        let ctx = Context::background();
        let cmd = poller.schedule(TAG, &ctx).unwrap();
        ctx.cancel();
        assert_eq!(cmd.run().await, None);
    }
}
